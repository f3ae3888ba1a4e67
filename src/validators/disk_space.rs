//! Disk-space preflight
//!
//! Compares free space on the target filesystem against fixed per-operation
//! thresholds and, when environment definitions are known, against a rough
//! estimate of what installing them will take.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::env_yaml::count_packages;
use crate::error::{EngineError, Result};
use crate::filesystem::FileSystem;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const MB_PER_GB: f64 = 1024.0;

/// Tunable constants of the space estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSpaceSettings {
    /// Average installed size of one package, in MB
    pub package_size_mb: f64,
    /// Multiplier applied to the package total
    pub buffer_factor: f64,
    /// Flat allowance added on top, in GB
    pub base_buffer_gb: f64,
    /// Charged for a definition that cannot be read or parsed, in GB
    pub invalid_definition_gb: f64,
}

impl Default for DiskSpaceSettings {
    fn default() -> Self {
        Self {
            package_size_mb: 50.0,
            buffer_factor: 1.5,
            base_buffer_gb: 10.0,
            invalid_definition_gb: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub minimum_gb: f64,
    pub recommended_gb: f64,
}

impl Thresholds {
    pub fn for_operation(operation: &str) -> Self {
        let (minimum_gb, recommended_gb) = match operation {
            "bootstrap" => (5.0, 10.0),
            "deploy" => (15.0, 30.0),
            _ => (10.0, 20.0),
        };
        Self {
            minimum_gb,
            recommended_gb,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSpaceLevel {
    Ok,
    Info,
    Warning,
}

/// Outcome of a passing preflight
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSpaceReport {
    pub available_gb: f64,
    pub thresholds: Thresholds,
    pub estimated_gb: Option<f64>,
    pub level: DiskSpaceLevel,
    /// Empty when there is nothing worth reporting
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "Insufficient disk space for {operation} at {}: {available_gb:.1} GB available, \
     {required_gb:.1} GB required. Free up space or rerun with --force to override.",
    path.display()
)]
pub struct DiskSpaceError {
    pub operation: String,
    pub path: PathBuf,
    pub available_gb: f64,
    pub required_gb: f64,
}

/// Apply the decision table to an already-measured amount of free space
pub fn evaluate_disk_space(
    available_gb: f64,
    operation: &str,
    path: &Path,
    estimated_gb: Option<f64>,
    force: bool,
) -> std::result::Result<DiskSpaceReport, DiskSpaceError> {
    let thresholds = Thresholds::for_operation(operation);
    let report = |level, message: String| DiskSpaceReport {
        available_gb,
        thresholds,
        estimated_gb,
        level,
        message,
    };

    if available_gb < thresholds.minimum_gb {
        if !force {
            return Err(DiskSpaceError {
                operation: operation.to_string(),
                path: path.to_path_buf(),
                available_gb,
                required_gb: thresholds.minimum_gb,
            });
        }
        return Ok(report(
            DiskSpaceLevel::Warning,
            format!(
                "WARNING: only {available_gb:.1} GB available for {operation}, below the \
                 {:.1} GB minimum; continuing because force was requested",
                thresholds.minimum_gb
            ),
        ));
    }

    if let Some(estimated) = estimated_gb {
        if available_gb < estimated {
            return Ok(report(
                DiskSpaceLevel::Warning,
                format!(
                    "WARNING: {available_gb:.1} GB available but the requested environments \
                     are estimated to need {estimated:.1} GB"
                ),
            ));
        }
    }

    if available_gb < thresholds.recommended_gb {
        return Ok(report(
            DiskSpaceLevel::Info,
            format!(
                "{available_gb:.1} GB available for {operation}; {:.1} GB is recommended",
                thresholds.recommended_gb
            ),
        ));
    }

    Ok(report(DiskSpaceLevel::Ok, String::new()))
}

/// Estimated space in GB needed to create the given environments
pub fn estimate_required_space(
    fs: &dyn FileSystem,
    env_defs: &[PathBuf],
    settings: &DiskSpaceSettings,
) -> f64 {
    let mut packages = 0usize;
    let mut flat_gb = 0.0;

    for def in env_defs {
        let counted = fs
            .read_to_string(def)
            .ok()
            .and_then(|content| count_packages(&content));
        match counted {
            Some(count) => packages += count,
            None => {
                debug!("Cannot size {}; using flat estimate", def.display());
                flat_gb += settings.invalid_definition_gb;
            }
        }
    }

    let package_gb = packages as f64 * settings.package_size_mb * settings.buffer_factor / MB_PER_GB;
    package_gb + flat_gb + settings.base_buffer_gb
}

/// Check free space on the filesystem holding `path` (or its nearest
/// existing ancestor) before a long-running operation.
pub fn check_disk_space(
    fs: &dyn FileSystem,
    path: &Path,
    operation: &str,
    env_defs: Option<&[PathBuf]>,
    force: bool,
    settings: &DiskSpaceSettings,
) -> Result<DiskSpaceReport> {
    let probe = nearest_existing_ancestor(fs, path);
    let bytes = fs.available_space(&probe).map_err(|e| {
        EngineError::io(format!("cannot stat filesystem at {}", probe.display()), e)
    })?;
    let available_gb = bytes as f64 / BYTES_PER_GB;

    let estimated_gb = env_defs
        .filter(|defs| !defs.is_empty())
        .map(|defs| estimate_required_space(fs, defs, settings));
    debug!(
        "Disk space for {operation} at {}: {available_gb:.1} GB available, estimate {:?}",
        probe.display(),
        estimated_gb
    );

    evaluate_disk_space(available_gb, operation, path, estimated_gb, force)
        .map_err(EngineError::from)
}

fn nearest_existing_ancestor(fs: &dyn FileSystem, path: &Path) -> PathBuf {
    path.ancestors()
        .find(|candidate| !candidate.as_os_str().is_empty() && fs.exists(candidate))
        .unwrap_or_else(|| Path::new("/"))
        .to_path_buf()
}
