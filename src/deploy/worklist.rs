use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::filesystem::FileSystem;

pub const UNIVERSAL_DIR: &str = "universal";

/// The one extra definition installed on a given host OS, if any
pub fn platform_definition(defs_dir: &Path, os: &str) -> Option<PathBuf> {
    match os {
        "linux" => Some(defs_dir.join("linux").join("linux.yaml")),
        "macos" => Some(defs_dir.join("mac").join("mac.yaml")),
        _ => None,
    }
}

/// Every file under `universal/` in lexical order, then the platform file.
/// Anything that is not an existing regular file is dropped.
pub fn discover_definitions(fs: &dyn FileSystem, defs_dir: &Path, os: &str) -> Vec<PathBuf> {
    let universal = defs_dir.join(UNIVERSAL_DIR);
    let mut worklist = match fs.read_dir(&universal) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {e}", universal.display());
            Vec::new()
        }
    };
    worklist.sort();
    worklist.extend(platform_definition(defs_dir, os));

    worklist.retain(|item| {
        let keep = fs.is_file(item);
        if !keep {
            error!("not a file: {}", item.display());
        }
        keep
    });
    debug!("worklist={:?}", worklist);
    worklist
}

/// Relative definition paths are taken relative to the definitions directory
pub fn resolve_definitions(defs_dir: &Path, defs: &[PathBuf]) -> Vec<PathBuf> {
    defs.iter().map(|def| defs_dir.join(def)).collect()
}
