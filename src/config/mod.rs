//! Engine configuration
//!
//! Paths the orchestrator works with are resolved once, up front, into an
//! [`EnginePaths`] value and passed in explicitly. Each field comes from the
//! first source that provides it: command-line flag, environment variable,
//! config file, then a default derived from the running executable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::validators::DiskSpaceSettings;

pub const MAMBA_ENV: &str = "TIER_ENGINE_MAMBA";
pub const RESOURCES_ENV: &str = "TIER_ENGINE_RESOURCES";
pub const CONFIG_ENV: &str = "TIER_ENGINE_CONFIG";

pub const DEFAULT_CHANNEL: &str = "conda-forge";

/// How existing environments and tier directories are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    /// Recreate environments; wipe only dev/test/staging tiers
    #[default]
    Normal,
    /// Leave existing environments untouched
    Keep,
    /// Recreate everything and override the disk-space minimum
    Force,
}

impl DeployMode {
    pub fn is_keep(self) -> bool {
        self == DeployMode::Keep
    }

    pub fn is_force(self) -> bool {
        self == DeployMode::Force
    }
}

/// Optional YAML configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mamba: Option<PathBuf>,
    pub resources: Option<PathBuf>,
    pub default_channel: String,
    pub disk_space: DiskSpaceSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mamba: None,
            resources: None,
            default_channel: DEFAULT_CHANNEL.to_string(),
            disk_space: DiskSpaceSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| EngineError::config("invalid configuration file").with_source(e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("cannot read {}", path.display())).with_source(e)
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml(&content)
    }

    /// Load the file named on the command line or by `TIER_ENGINE_CONFIG`,
    /// falling back to defaults when neither is given
    pub fn discover<F>(cli_path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = cli_path
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from));
        match path {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Explicit path overrides from the command line
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub mamba: Option<PathBuf>,
    pub resources: Option<PathBuf>,
}

/// Fully resolved locations of everything the deployer reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    pub mamba: PathBuf,
    pub resource_root: PathBuf,
    pub defs_dir: PathBuf,
    pub source_repo: PathBuf,
}

impl EnginePaths {
    pub fn new(mamba: impl Into<PathBuf>, resource_root: impl Into<PathBuf>) -> Self {
        let resource_root = resource_root.into();
        Self {
            mamba: mamba.into(),
            defs_dir: resource_root.join("defs"),
            source_repo: resource_root.clone(),
            resource_root,
        }
    }

    pub fn resolve<F>(
        overrides: &PathOverrides,
        config: &EngineConfig,
        env: F,
        current_exe: &Path,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        let mamba = overrides
            .mamba
            .clone()
            .or_else(|| from_env(MAMBA_ENV))
            .or_else(|| config.mamba.clone())
            .unwrap_or_else(|| current_exe.with_file_name("mamba"));

        let resources = overrides
            .resources
            .clone()
            .or_else(|| from_env(RESOURCES_ENV))
            .or_else(|| config.resources.clone())
            .unwrap_or_else(|| default_resources(current_exe));

        let paths = Self::new(mamba, resources);
        debug!("Resolved engine paths: {:?}", paths);
        paths
    }

    /// Source tree copied into the tier for the given resource name
    pub fn resource(&self, name: &str) -> PathBuf {
        self.resource_root.join(name)
    }
}

fn default_resources(current_exe: &Path) -> PathBuf {
    current_exe
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("/"))
        .join("resources")
}

/// Path of the running executable
pub fn current_exe() -> Result<PathBuf> {
    std::env::current_exe().map_err(|e| EngineError::io("cannot locate the running executable", e))
}

#[cfg(test)]
mod tests;
