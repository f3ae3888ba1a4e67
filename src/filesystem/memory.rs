use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{resolve_with, FileSystem};

/// Default free space reported by the fake: plenty for any preflight.
const DEFAULT_AVAILABLE_BYTES: u64 = 1024 * 1024 * 1024 * 1024;

/// In-memory filesystem for tests.
///
/// Tracks directories, file contents, and symlinks, and records every
/// removal and tree copy so tests can assert on what the deployer did.
#[derive(Clone)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<MemoryState>>,
}

struct MemoryState {
    directories: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    symlinks: BTreeMap<PathBuf, PathBuf>,
    removed: Vec<PathBuf>,
    copied: Vec<(PathBuf, PathBuf)>,
    available_bytes: u64,
}

impl MemoryState {
    fn resolve(&self, path: &Path) -> PathBuf {
        resolve_with(path, |candidate| self.symlinks.get(candidate).cloned())
    }

    /// Resolve every component except the last, which is looked up as-is.
    fn locate(&self, path: &Path) -> PathBuf {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => self.resolve(parent).join(name),
            _ => self.resolve(path),
        }
    }

    fn occupied(&self, literal: &Path) -> bool {
        self.directories.contains(literal)
            || self.files.contains_key(literal)
            || self.symlinks.contains_key(literal)
    }

    fn add_dir_with_parents(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.directories.insert(ancestor.to_path_buf());
        }
    }

    fn require_parent(&self, literal: &Path) -> io::Result<()> {
        match literal.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                if self.directories.contains(&self.resolve(parent)) {
                    Ok(())
                } else {
                    Err(not_found(parent))
                }
            }
            _ => Ok(()),
        }
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                directories: BTreeSet::new(),
                files: BTreeMap::new(),
                symlinks: BTreeMap::new(),
                removed: Vec::new(),
                copied: Vec::new(),
                available_bytes: DEFAULT_AVAILABLE_BYTES,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a directory and all of its parents
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.lock().add_dir_with_parents(path.as_ref());
    }

    /// Add a file with contents, creating its parent directories
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            state.add_dir_with_parents(parent);
        }
        state.files.insert(path.to_path_buf(), contents.into());
    }

    /// Add a symlink, creating its parent directories
    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let link = link.as_ref();
        let mut state = self.lock();
        if let Some(parent) = link.parent() {
            state.add_dir_with_parents(parent);
        }
        state
            .symlinks
            .insert(link.to_path_buf(), target.as_ref().to_path_buf());
    }

    /// Set the free space reported by `available_space`
    pub fn set_available_bytes(&self, bytes: u64) {
        self.lock().available_bytes = bytes;
    }

    /// Paths passed to `remove_dir_all`, in call order
    pub fn removed(&self) -> Vec<PathBuf> {
        self.lock().removed.clone()
    }

    /// `(src, dst)` pairs passed to `copy_tree`, in call order
    pub fn copied(&self) -> Vec<(PathBuf, PathBuf)> {
        self.lock().copied.clone()
    }

    /// Contents of a file, without following symlinks on the final component
    pub fn file_contents(&self, path: impl AsRef<Path>) -> Option<String> {
        let state = self.lock();
        let resolved = state.resolve(path.as_ref());
        state
            .files
            .get(&resolved)
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
    }

    /// Every directory currently present, sorted
    pub fn directories(&self) -> Vec<PathBuf> {
        self.lock().directories.iter().cloned().collect()
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let resolved = state.resolve(path);
        if state.files.contains_key(&resolved) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            ));
        }
        state.add_dir_with_parents(&resolved);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let literal = state.locate(path);
        if state.symlinks.remove(&literal).is_some() {
            state.removed.push(literal);
            return Ok(());
        }
        if !state.directories.contains(&literal) {
            return Err(not_found(path));
        }
        state.removed.push(literal.clone());
        state
            .directories
            .retain(|dir| !dir.starts_with(&literal));
        state.files.retain(|file, _| !file.starts_with(&literal));
        state.symlinks.retain(|link, _| !link.starts_with(&literal));
        Ok(())
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let src = state.resolve(src);
        let dst = state.locate(dst);
        if !state.directories.contains(&src) {
            return Err(not_found(&src));
        }
        if state.occupied(&dst) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("destination already exists: {}", dst.display()),
            ));
        }
        state.require_parent(&dst)?;

        let rebase = |path: &Path| -> PathBuf {
            match path.strip_prefix(&src) {
                Ok(rel) if rel.as_os_str().is_empty() => dst.clone(),
                Ok(rel) => dst.join(rel),
                Err(_) => path.to_path_buf(),
            }
        };

        let dirs: Vec<_> = state
            .directories
            .iter()
            .filter(|dir| dir.starts_with(&src))
            .map(|dir| rebase(dir.as_path()))
            .collect();
        let files: Vec<_> = state
            .files
            .iter()
            .filter(|(file, _)| file.starts_with(&src))
            .map(|(file, bytes)| (rebase(file.as_path()), bytes.clone()))
            .collect();
        let links: Vec<_> = state
            .symlinks
            .iter()
            .filter(|(link, _)| link.starts_with(&src))
            .map(|(link, target)| (rebase(link.as_path()), target.clone()))
            .collect();

        state.directories.extend(dirs);
        state.files.extend(files);
        state.symlinks.extend(links);
        state.copied.push((src, dst));
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let literal = state.locate(link);
        if state.occupied(&literal) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already exists: {}", link.display()),
            ));
        }
        state.require_parent(&literal)?;
        state.symlinks.insert(literal, target.to_path_buf());
        Ok(())
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let literal = state.locate(link);
        if state.directories.contains(&literal) || state.files.contains_key(&literal) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("not a symlink: {}", link.display()),
            ));
        }
        state.require_parent(&literal)?;
        state.symlinks.insert(literal, target.to_path_buf());
        Ok(())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.lock();
        let literal = state.locate(path);
        state.symlinks.get(&literal).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a symlink: {}", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        let resolved = state.resolve(path);
        state.directories.contains(&resolved) || state.files.contains_key(&resolved)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let state = self.lock();
        let resolved = state.resolve(path);
        state.directories.contains(&resolved)
    }

    fn is_file(&self, path: &Path) -> bool {
        let state = self.lock();
        let resolved = state.resolve(path);
        state.files.contains_key(&resolved)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        let state = self.lock();
        let literal = state.locate(path);
        state.symlinks.contains_key(&literal)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let state = self.lock();
        let resolved = state.resolve(path);
        let bytes = state.files.get(&resolved).ok_or_else(|| not_found(path))?;
        String::from_utf8(bytes.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        let resolved = state.resolve(path);
        if state.directories.contains(&resolved) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("is a directory: {}", path.display()),
            ));
        }
        state.require_parent(&resolved)?;
        state.files.insert(resolved, contents.to_vec());
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.lock();
        let resolved = state.resolve(path);
        if !state.directories.contains(&resolved) {
            return Err(not_found(path));
        }
        let is_child = |candidate: &Path| candidate.parent() == Some(resolved.as_path());
        let entries: BTreeSet<PathBuf> = state
            .directories
            .iter()
            .filter(|p| is_child(p.as_path()))
            .chain(state.files.keys().filter(|p| is_child(p.as_path())))
            .chain(state.symlinks.keys().filter(|p| is_child(p.as_path())))
            .map(|p| path.join(p.file_name().unwrap_or_default()))
            .collect();
        Ok(entries.into_iter().collect())
    }

    fn available_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.lock().available_bytes)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}
