//! Preflight checks run before anything on disk is changed

pub mod disk_space;
pub mod env_yaml;
pub mod symlink;

pub use disk_space::{
    check_disk_space, estimate_required_space, evaluate_disk_space, DiskSpaceError,
    DiskSpaceLevel, DiskSpaceReport, DiskSpaceSettings, Thresholds,
};
pub use env_yaml::validate_env_yaml;
pub use symlink::{validate_symlink_target, SymlinkValidationError};

use std::path::Path;
use thiserror::Error;

use crate::error::{EngineError, Result};
use crate::filesystem::FileSystem;

/// A rejected environment definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Confirm an external binary is present as a regular file
pub fn check_binary(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    tracing::info!("Package manager: {}", path.display());
    if fs.is_file(path) {
        Ok(())
    } else {
        Err(EngineError::MambaMissing {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExitCode;
    use crate::filesystem::MemoryFileSystem;

    #[test]
    fn test_check_binary_present() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/opt/engine/bin/mamba", "");
        check_binary(&fs, Path::new("/opt/engine/bin/mamba")).unwrap();
    }

    #[test]
    fn test_check_binary_missing() {
        let fs = MemoryFileSystem::new();
        fs.add_dir("/opt/engine/bin/mamba");

        let err = check_binary(&fs, Path::new("/opt/engine/bin/mamba")).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::MAMBA_MISSING);
    }
}
