//! Filesystem abstraction layer
//!
//! Provides a trait-based abstraction over the directory, file, and symlink
//! primitives the deployer and promoter need, so orchestration logic can be
//! tested against an in-memory fake without touching the real disk.

pub mod memory;
pub mod real;

pub use memory::MemoryFileSystem;
pub use real::RealFileSystem;

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Symlink hops followed before resolution gives up, matching the kernel's ELOOP limit.
const MAX_SYMLINK_HOPS: usize = 40;

/// Trait for filesystem operations
pub trait FileSystem: Send + Sync {
    /// Create a directory and any missing parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory tree
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy a directory tree to a destination that must not exist yet.
    /// Symlinks are recreated as symlinks rather than followed.
    fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Create a symbolic link at `link` pointing to `target`
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Create or atomically replace the symbolic link at `link`
    fn replace_symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Read the immediate target of a symbolic link
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Check if a path exists, following symlinks
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a directory, following symlinks
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if a path is a regular file, following symlinks
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is itself a symbolic link
    fn is_symlink(&self, path: &Path) -> bool;

    /// Read a whole file as UTF-8
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write a whole file, replacing any previous contents
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// List the entries of a directory, sorted by path
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Bytes available to unprivileged users on the filesystem holding `path`
    fn available_space(&self, path: &Path) -> io::Result<u64>;
}

/// Resolve `path` the way a non-strict `realpath` would: symlinks along the
/// way are followed, `.` and `..` are collapsed, and components that do not
/// exist yet are appended unchanged.
pub fn resolve_path(fs: &dyn FileSystem, path: &Path) -> PathBuf {
    resolve_with(path, |candidate| {
        if fs.is_symlink(candidate) {
            fs.read_link(candidate).ok()
        } else {
            None
        }
    })
}

/// Lexically normalize a path without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    resolve_with(path, |_| None)
}

enum Part {
    Root(OsString),
    Parent,
    Normal(OsString),
}

fn parts_of(path: &Path) -> Vec<Part> {
    path.components()
        .filter_map(|component| match component {
            Component::Prefix(prefix) => Some(Part::Root(prefix.as_os_str().to_owned())),
            Component::RootDir => Some(Part::Root(component.as_os_str().to_owned())),
            Component::CurDir => None,
            Component::ParentDir => Some(Part::Parent),
            Component::Normal(name) => Some(Part::Normal(name.to_owned())),
        })
        .collect()
}

pub(crate) fn resolve_with<F>(path: &Path, read_link: F) -> PathBuf
where
    F: Fn(&Path) -> Option<PathBuf>,
{
    let mut remaining: VecDeque<Part> = parts_of(path).into();
    let mut current = PathBuf::new();
    let mut hops = 0;

    while let Some(part) = remaining.pop_front() {
        match part {
            Part::Root(root) => current.push(root),
            Part::Parent => {
                current.pop();
            }
            Part::Normal(name) => {
                let candidate = current.join(&name);
                if hops < MAX_SYMLINK_HOPS {
                    if let Some(target) = read_link(&candidate) {
                        hops += 1;
                        if target.is_absolute() {
                            current = PathBuf::new();
                        }
                        for part in parts_of(&target).into_iter().rev() {
                            remaining.push_front(part);
                        }
                        continue;
                    }
                }
                current = candidate;
            }
        }
    }

    current
}
