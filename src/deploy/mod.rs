//! Tier deployment
//!
//! [`deploy_tier`] runs the whole flow for one tier: preflight checks, tier
//! directory setup and reset, one `mamba env create` per definition, then the
//! `bin`/`etc` mirror and the source metadata snapshot.

pub mod deployer;
pub mod metadata;
pub mod worklist;

pub use deployer::{package_manager_env, DeployerSettings, MambaDeployer, DRY_RUN_PREFIX};
pub use metadata::{TierMetadata, FALLBACK, META_DIR};
pub use worklist::{discover_definitions, platform_definition, resolve_definitions};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{DeployMode, EngineConfig, EnginePaths};
use crate::error::{EngineError, Result};
use crate::filesystem::FileSystem;
use crate::subprocess::SubprocessManager;
use crate::tier::{check_tier_path, is_resettable_tier, resolve_tier_path, setup_tier_path, PRODUCTION};
use crate::validators::{check_binary, check_disk_space, DiskSpaceLevel, DiskSpaceReport};

/// Resource trees mirrored from the resource root into every tier
pub const RESOURCE_DIRS: &[&str] = &["bin", "etc"];

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub dry_run: bool,
    pub offline: bool,
    pub mode: DeployMode,
    /// Explicit definitions; `None` discovers them from the definitions directory
    pub env_defs: Option<Vec<PathBuf>>,
}

/// Everything [`deploy_tier`] needs from the outside world
#[derive(Clone)]
pub struct DeployContext {
    pub fs: Arc<dyn FileSystem>,
    pub subprocess: SubprocessManager,
    pub paths: EnginePaths,
    pub config: EngineConfig,
    /// Host OS name as reported by `std::env::consts::OS`
    pub platform: String,
}

impl DeployContext {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        subprocess: SubprocessManager,
        paths: EnginePaths,
        config: EngineConfig,
    ) -> Self {
        Self {
            fs,
            subprocess,
            paths,
            config,
            platform: std::env::consts::OS.to_string(),
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvStatus {
    Created,
    /// Already present and left alone in keep mode
    Kept,
    /// Rejected by the definition validator
    Invalid { reason: String },
    /// The package manager exited non-zero
    Failed { return_code: i32 },
    /// The package manager could not be run at all
    Errored { message: String },
}

impl EnvStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, EnvStatus::Created | EnvStatus::Kept)
    }

    /// Process-style return code, 0 for success and kept environments
    pub fn return_code(&self) -> i32 {
        match self {
            EnvStatus::Created | EnvStatus::Kept => 0,
            EnvStatus::Failed { return_code } => *return_code,
            EnvStatus::Invalid { .. } | EnvStatus::Errored { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOutcome {
    pub name: String,
    pub definition: PathBuf,
    pub status: EnvStatus,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub tier: String,
    pub tier_path: PathBuf,
    pub dry_run: bool,
    pub disk_space: DiskSpaceReport,
    pub environments: Vec<EnvOutcome>,
}

impl DeployReport {
    pub fn failures(&self) -> impl Iterator<Item = &EnvOutcome> {
        self.environments.iter().filter(|env| !env.status.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Deploy every environment definition into `target/infrastructure/tier`.
///
/// Fatal errors abort before the step that would have changed anything.
/// Failures of individual environments are recorded in the report instead.
pub async fn deploy_tier(
    ctx: &DeployContext,
    target: &Path,
    tier: &str,
    options: &DeployOptions,
) -> Result<DeployReport> {
    let fs = ctx.fs.as_ref();
    let mode = options.mode;
    info!("Deploying tier {tier} under {}", target.display());

    check_tier_path(fs, target, tier)?;

    let worklist = match &options.env_defs {
        Some(defs) => resolve_definitions(&ctx.paths.defs_dir, defs),
        None => discover_definitions(fs, &ctx.paths.defs_dir, &ctx.platform),
    };

    let disk_space = check_disk_space(
        fs,
        target,
        "deploy",
        Some(worklist.as_slice()),
        mode.is_force(),
        &ctx.config.disk_space,
    )?;
    log_disk_space(&disk_space);

    check_binary(fs, &ctx.paths.mamba)?;

    let production_path = resolve_tier_path(fs, target, PRODUCTION);
    let resolved = resolve_tier_path(fs, target, tier);
    if resolved == production_path {
        return Err(EngineError::ProductionCollision {
            tier: tier.to_string(),
            path: production_path,
        });
    }

    let existed = fs.is_dir(&resolved);
    let tier_path = setup_tier_path(fs, target, tier)?;
    if existed && !mode.is_keep() && (is_resettable_tier(tier) || mode.is_force()) {
        if options.dry_run {
            info!("Dry run: would reset {}", tier_path.display());
        } else {
            reset_tier(fs, &tier_path)?;
        }
    }

    let deployer = MambaDeployer::new(
        fs,
        ctx.subprocess.runner(),
        DeployerSettings {
            mamba: ctx.paths.mamba.clone(),
            target: target.to_path_buf(),
            tier_path: tier_path.clone(),
            channel: ctx.config.default_channel.clone(),
            dry_run: options.dry_run,
            offline: options.offline,
            mode,
        },
    )?;
    if mode.is_keep() {
        deployer.info().await;
    }

    let total = worklist.len();
    let mut environments = Vec::with_capacity(total);
    for (index, definition) in worklist.iter().enumerate() {
        info!("[{}/{total}] {}", index + 1, definition.display());
        environments.push(deployer.deploy_env(definition).await);
    }

    let report = DeployReport {
        tier: tier.to_string(),
        tier_path: tier_path.clone(),
        dry_run: options.dry_run,
        disk_space,
        environments,
    };
    if options.dry_run {
        info!("Dry run: skipping resource copy and metadata");
        return Ok(report);
    }

    for name in RESOURCE_DIRS {
        mirror_resource(fs, &ctx.paths.resource(name), &tier_path.join(name), mode)?;
    }

    let git = ctx.subprocess.git();
    TierMetadata::capture(&git, &ctx.paths.source_repo)
        .await
        .write(fs, &tier_path)?;

    for failure in report.failures() {
        error!("{}: {:?}", failure.name, failure.status);
    }
    info!("Deployed tier {tier} to {}", tier_path.display());
    Ok(report)
}

fn log_disk_space(report: &DiskSpaceReport) {
    match report.level {
        DiskSpaceLevel::Warning => warn!("{}", report.message),
        DiskSpaceLevel::Info => info!("{}", report.message),
        DiskSpaceLevel::Ok => {}
    }
}

fn reset_tier(fs: &dyn FileSystem, tier_path: &Path) -> Result<()> {
    info!("Resetting {}", tier_path.display());
    fs.remove_dir_all(tier_path)
        .map_err(|e| EngineError::io(format!("remove {}", tier_path.display()), e))?;
    fs.create_dir_all(tier_path)
        .map_err(|e| EngineError::io(format!("create {}", tier_path.display()), e))
}

/// Replace `dst` with a full copy of `src`. A symlink at `dst`, dangling or
/// not, is removed rather than followed.
fn mirror_resource(fs: &dyn FileSystem, src: &Path, dst: &Path, mode: DeployMode) -> Result<()> {
    if fs.exists(dst) || fs.is_symlink(dst) {
        if !mode.is_keep() {
            warn!("Replacing existing {}", dst.display());
        }
        fs.remove_dir_all(dst)
            .map_err(|e| EngineError::io(format!("remove {}", dst.display()), e))?;
    }
    info!("Copying {} -> {}", src.display(), dst.display());
    fs.copy_tree(src, dst)
        .map_err(|e| EngineError::io(format!("copy {} to {}", src.display(), dst.display()), e))
}
