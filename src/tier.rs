//! Tier names and the directories they map to
//!
//! A tier lives at `<target>/infrastructure/<tier>`. `blue` and `green` are
//! real directories; `staging` and `production` are symlinks to one of them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::filesystem::{normalize_lexically, resolve_path, FileSystem};

pub const INFRASTRUCTURE_DIR: &str = "infrastructure";
pub const PRODUCTION: &str = "production";
pub const STAGING: &str = "staging";

static TIER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(blue|green|staging|production|dev.*|test.*)$").expect("valid tier regex")
});

static RESETTABLE_TIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(dev.*|test.*|staging)$").expect("valid reset regex"));

pub fn is_valid_tier_name(tier: &str) -> bool {
    TIER_NAME.is_match(tier)
}

/// Tiers that are wiped on redeploy even without force
pub fn is_resettable_tier(tier: &str) -> bool {
    RESETTABLE_TIER.is_match(tier)
}

/// `<target>/infrastructure/<tier>` with `.` and `..` collapsed.
/// Touches nothing on disk.
pub fn validate_tier_path(target: &Path, tier: &str) -> PathBuf {
    normalize_lexically(&target.join(INFRASTRUCTURE_DIR).join(tier))
}

/// Where the tier actually lives once staging/production symlinks are followed
pub fn resolve_tier_path(fs: &dyn FileSystem, target: &Path, tier: &str) -> PathBuf {
    resolve_path(fs, &target.join(INFRASTRUCTURE_DIR).join(tier))
}

/// Check the target and tier name, then make sure the tier directory exists.
///
/// Returns the resolved tier directory.
pub fn setup_tier_path(fs: &dyn FileSystem, target: &Path, tier: &str) -> Result<PathBuf> {
    check_tier_path(fs, target, tier)?;

    let tier_path = resolve_tier_path(fs, target, tier);
    if !fs.is_dir(&tier_path) {
        info!("Creating tier directory {}", tier_path.display());
        fs.create_dir_all(&tier_path)
            .map_err(|e| EngineError::io(format!("create {}", tier_path.display()), e))?;
    }
    Ok(tier_path)
}

/// Every precondition of [`setup_tier_path`] without creating anything
pub fn check_tier_path(fs: &dyn FileSystem, target: &Path, tier: &str) -> Result<()> {
    if !target.is_absolute() {
        return Err(EngineError::bad_target(format!(
            "target must be an absolute path: {}",
            target.display()
        )));
    }
    if !is_valid_tier_name(tier) {
        return Err(EngineError::bad_target(format!("invalid tier name: {tier:?}")));
    }
    if !fs.is_dir(target) {
        return Err(EngineError::bad_target(format!(
            "target is not a directory: {}",
            target.display()
        )));
    }

    let lexical = validate_tier_path(target, tier);
    let root = normalize_lexically(target);
    if !lexical.starts_with(&root) || lexical == root {
        return Err(EngineError::PathTraversal {
            path: lexical,
            target: target.to_path_buf(),
        });
    }

    let resolved = resolve_tier_path(fs, target, tier);
    let resolved_root = resolve_path(fs, target);
    if !resolved.starts_with(&resolved_root) {
        return Err(EngineError::PathTraversal {
            path: resolved,
            target: target.to_path_buf(),
        });
    }

    debug!("Tier {tier} resolves to {}", resolved.display());
    Ok(())
}
