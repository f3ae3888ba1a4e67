use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use tier_engine::config::{current_exe, DeployMode, EngineConfig, EnginePaths, PathOverrides};
use tier_engine::deploy::{deploy_tier, DeployContext, DeployOptions, DeployReport};
use tier_engine::engine::{bootstrap, BootstrapOptions};
use tier_engine::filesystem::{FileSystem, RealFileSystem};
use tier_engine::logging::init_logging;
use tier_engine::promote::promote_from_env;
use tier_engine::subprocess::SubprocessManager;
use tier_engine::error::describe_exit_code;
use tier_engine::{EngineError, ExitCode};

/// Blue/green deployment of conda environments
#[derive(Parser)]
#[command(name = "tier-engine", version)]
#[command(about = "Deploy conda environments into blue/green infrastructure tiers", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Package manager executable
    #[arg(long, global = true)]
    mamba: Option<PathBuf>,

    /// Directory holding `defs/`, `bin/`, and `etc/`
    #[arg(long, global = true)]
    resources: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy environments into a tier
    Deploy {
        /// Existing directory that holds `infrastructure/`
        target: PathBuf,

        /// blue, green, staging, dev*, or test*
        tier: String,

        /// Do not download packages
        #[arg(long)]
        offline: bool,

        /// Print package manager commands instead of running them
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Leave existing environments untouched
        #[arg(long, overrides_with = "force")]
        keep: bool,

        /// Recreate everything, even below the disk space minimum
        #[arg(long, overrides_with = "keep")]
        force: bool,

        /// Environment definition to deploy (repeatable); relative paths are
        /// taken from the definitions directory
        #[arg(long = "env-def", value_name = "PATH")]
        env_defs: Vec<PathBuf>,
    },
    /// Promote the staging directory named by IAC_TIER_DIR to production
    Promote,
    /// Build a fresh engine environment and switch to it
    Bootstrap {
        /// Engine home directory
        home: PathBuf,

        /// conda executable used to build the engine
        #[arg(long)]
        conda: PathBuf,

        /// Environment definition for the engine
        #[arg(long)]
        engine_def: PathBuf,

        /// Do not download packages
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(ExitCode::USAGE);
        }
    };
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {e:#}");
        eprintln!("Error: {e:#}");
        let code = e
            .downcast_ref::<EngineError>()
            .map(EngineError::exit_code)
            .unwrap_or(ExitCode::GENERIC);
        debug!("exit code {code}: {}", describe_exit_code(code));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let env = |key: &str| std::env::var(key).ok();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    match cli.command {
        Commands::Deploy {
            target,
            tier,
            offline,
            dry_run,
            keep,
            force,
            env_defs,
        } => {
            let config = EngineConfig::discover(cli.config.as_deref(), env)?;
            let overrides = PathOverrides {
                mamba: cli.mamba,
                resources: cli.resources,
            };
            let paths = EnginePaths::resolve(&overrides, &config, env, &current_exe()?);
            let ctx = DeployContext::new(fs, SubprocessManager::production(), paths, config);

            let mode = if force {
                DeployMode::Force
            } else if keep {
                DeployMode::Keep
            } else {
                DeployMode::Normal
            };
            let options = DeployOptions {
                dry_run,
                offline,
                mode,
                env_defs: (!env_defs.is_empty()).then_some(env_defs),
            };
            debug!("options={:?}", options);

            let report = deploy_tier(&ctx, &target, &tier, &options).await?;
            log_summary(&report);
        }
        Commands::Promote => {
            let promotion = promote_from_env(fs.as_ref(), env)?;
            info!(
                "production -> {}, staging -> {}",
                promotion.production, promotion.staging
            );
        }
        Commands::Bootstrap {
            home,
            conda,
            engine_def,
            offline,
        } => {
            let config = EngineConfig::discover(cli.config.as_deref(), env)?;
            let options = BootstrapOptions {
                home,
                conda,
                engine_def,
                offline,
            };
            let runner = SubprocessManager::production().runner();
            let engine = bootstrap(fs.as_ref(), runner, &options, &config.disk_space).await?;
            info!("Engine ready at {}", engine.display());
        }
    }
    Ok(())
}

fn log_summary(report: &DeployReport) {
    for env in &report.environments {
        if env.status.is_success() {
            info!("{}: {:?}", env.name, env.status);
        } else {
            warn!("{}: {:?}", env.name, env.status);
        }
    }
    let failed = report.failures().count();
    info!(
        "Tier {}: {} environment(s), {failed} failed{}",
        report.tier,
        report.environments.len(),
        if report.dry_run { " (dry run)" } else { "" }
    );
}
