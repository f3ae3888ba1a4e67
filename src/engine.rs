//! Engine rotation
//!
//! The engine environment itself lives in one of two directories under the
//! engine home, `engine_a` or `engine_b`, with the `engine` symlink naming
//! the active one. A bootstrap builds the inactive directory from scratch
//! and then flips the link, so the running engine is never modified.

use std::path::{Path, PathBuf};
use std::slice;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::filesystem::FileSystem;
use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessRunner};
use crate::validators::{
    check_binary, check_disk_space, validate_symlink_target, DiskSpaceLevel, DiskSpaceSettings,
    SymlinkValidationError,
};

pub const ENGINE_LINK: &str = "engine";
pub const ENGINE_A: &str = "engine_a";
pub const ENGINE_B: &str = "engine_b";

const ENGINE_DIRS: &[&str] = &[ENGINE_A, ENGINE_B];

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub home: PathBuf,
    pub conda: PathBuf,
    pub engine_def: PathBuf,
    pub offline: bool,
}

/// The directory to build next given the one `engine` points at now
pub fn next_engine_dir(current: Option<&str>) -> &'static str {
    match current {
        Some(ENGINE_A) => ENGINE_B,
        _ => ENGINE_A,
    }
}

/// Name of the engine directory the `engine` link points at, if any.
///
/// A missing link or one with an unrecognised target yields `None`. A
/// regular file or directory in place of the link is an error, since the
/// rotation would otherwise have to delete it.
pub fn current_engine(fs: &dyn FileSystem, home: &Path) -> Result<Option<String>> {
    let link = home.join(ENGINE_LINK);
    match validate_symlink_target(fs, &link, ENGINE_DIRS, false) {
        Ok(target) => Ok(target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())),
        Err(SymlinkValidationError::DoesNotExist { .. }) => Ok(None),
        Err(e @ SymlinkValidationError::UnexpectedTarget { .. }) => {
            warn!("{e}; starting over with {ENGINE_A}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Build a fresh engine in the inactive directory and point `engine` at it.
///
/// Returns the new engine directory.
pub async fn bootstrap(
    fs: &dyn FileSystem,
    runner: Arc<dyn ProcessRunner>,
    options: &BootstrapOptions,
    disk_space: &DiskSpaceSettings,
) -> Result<PathBuf> {
    let home = &options.home;
    info!("Bootstrapping engine in {}", home.display());
    if !fs.is_dir(home) {
        return Err(EngineError::bad_target(format!(
            "engine home is not a directory: {}",
            home.display()
        )));
    }
    check_binary(fs, &options.conda)?;
    if !fs.is_file(&options.engine_def) {
        return Err(EngineError::bad_target(format!(
            "engine definition is not a file: {}",
            options.engine_def.display()
        )));
    }

    let report = check_disk_space(
        fs,
        home,
        "bootstrap",
        Some(slice::from_ref(&options.engine_def)),
        false,
        disk_space,
    )?;
    match report.level {
        DiskSpaceLevel::Warning => warn!("{}", report.message),
        DiskSpaceLevel::Info => info!("{}", report.message),
        DiskSpaceLevel::Ok => {}
    }

    let current = current_engine(fs, home)?;
    let next = next_engine_dir(current.as_deref());
    let engine_path = home.join(next);
    info!("engine_path={}", engine_path.display());

    if fs.exists(&engine_path) {
        debug!("Removing stale {}", engine_path.display());
        fs.remove_dir_all(&engine_path)
            .map_err(|e| EngineError::io(format!("remove {}", engine_path.display()), e))?;
    }

    let mut builder = ProcessCommandBuilder::new(&options.conda.to_string_lossy())
        .args(["env", "create"]);
    if options.offline {
        builder = builder.arg("--offline");
    }
    let command = builder
        .arg("-p")
        .arg(&engine_path.to_string_lossy())
        .arg("-f")
        .arg(&options.engine_def.to_string_lossy())
        .env("HOME", &home.to_string_lossy())
        .isolated_env()
        .build();
    info!("conda_command={}", command.display());

    let output = runner.run(command).await?;
    if !output.status.success() {
        error!("{}", output.stderr.trim());
        return Err(ProcessError::ExitCode(output.status.return_code()).into());
    }
    debug!("{}", output.stdout.trim());

    let link = home.join(ENGINE_LINK);
    fs.replace_symlink(Path::new(next), &link)
        .map_err(|e| EngineError::io(format!("repoint {}", link.display()), e))?;
    info!("{} -> {next}", link.display());
    Ok(engine_path)
}
