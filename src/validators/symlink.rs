use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::filesystem::FileSystem;

#[derive(Debug, Error)]
pub enum SymlinkValidationError {
    #[error("Symlink {} does not exist", path.display())]
    DoesNotExist { path: PathBuf },

    #[error("Path {} exists but is not a symlink", path.display())]
    NotASymlink { path: PathBuf },

    #[error("Cannot read symlink {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Symlink {} points to {target:?}, expected one of: {}",
        path.display(),
        expected.join(", ")
    )]
    UnexpectedTarget {
        path: PathBuf,
        target: String,
        expected: Vec<String>,
    },

    #[error("Symlink {} points to non-existent target {}", path.display(), target.display())]
    DanglingTarget { path: PathBuf, target: PathBuf },
}

/// Check that `link` is a symlink whose immediate target is named one of
/// `expected`. Only the first hop is inspected; a link to another link is
/// judged by the intermediate link's name. With `check_exists` the fully
/// resolved target must also be present.
///
/// Returns the immediate target as read from the link.
pub fn validate_symlink_target(
    fs: &dyn FileSystem,
    link: &Path,
    expected: &[&str],
    check_exists: bool,
) -> Result<PathBuf, SymlinkValidationError> {
    if !fs.is_symlink(link) {
        return Err(if fs.exists(link) {
            SymlinkValidationError::NotASymlink {
                path: link.to_path_buf(),
            }
        } else {
            SymlinkValidationError::DoesNotExist {
                path: link.to_path_buf(),
            }
        });
    }

    let target = fs
        .read_link(link)
        .map_err(|source| SymlinkValidationError::Unreadable {
            path: link.to_path_buf(),
            source,
        })?;

    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    if !expected.contains(&name.as_str()) {
        return Err(SymlinkValidationError::UnexpectedTarget {
            path: link.to_path_buf(),
            target: name,
            expected: expected.iter().map(|s| s.to_string()).collect(),
        });
    }

    if check_exists && !fs.exists(link) {
        return Err(SymlinkValidationError::DanglingTarget {
            path: link.to_path_buf(),
            target,
        });
    }

    Ok(target)
}
