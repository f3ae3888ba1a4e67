use chrono::Local;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{EnvOutcome, EnvStatus};
use crate::config::DeployMode;
use crate::error::{EngineError, Result};
use crate::filesystem::FileSystem;
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder, ProcessRunner};
use crate::validators::validate_env_yaml;

/// Stand-in prefix that prints the command instead of running it
pub const DRY_RUN_PREFIX: &[&str] = &["/usr/bin/env", "echo"];

/// Settings a [`MambaDeployer`] is bound to for one tier
#[derive(Debug, Clone)]
pub struct DeployerSettings {
    pub mamba: PathBuf,
    pub target: PathBuf,
    pub tier_path: PathBuf,
    pub channel: String,
    pub dry_run: bool,
    pub offline: bool,
    pub mode: DeployMode,
}

/// Creates conda environments inside one tier with `mamba env create`
pub struct MambaDeployer<'a> {
    fs: &'a dyn FileSystem,
    runner: Arc<dyn ProcessRunner>,
    settings: DeployerSettings,
    envs_dir: PathBuf,
    log_dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl<'a> MambaDeployer<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        runner: Arc<dyn ProcessRunner>,
        settings: DeployerSettings,
    ) -> Result<Self> {
        let envs_dir = settings.tier_path.join("conda").join("envs");
        let log_dir = settings.tier_path.join("logs");
        let env = package_manager_env(&settings.target, &envs_dir, &settings.channel);
        info!("env={:?}", env);

        fs.create_dir_all(&log_dir)
            .map_err(|e| EngineError::io(format!("create {}", log_dir.display()), e))?;

        Ok(Self {
            fs,
            runner,
            settings,
            envs_dir,
            log_dir,
            env,
        })
    }

    pub fn envs_dir(&self) -> &Path {
        &self.envs_dir
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Log `mamba info` for the bound environment. Failures are only logged.
    pub async fn info(&self) {
        let command = self.base_command().arg("info").build();
        match self.runner.run(command).await {
            Ok(output) if output.status.success() => {
                for line in output.stdout.lines() {
                    info!("{line}");
                }
            }
            Ok(output) => warn!(
                "mamba info exited with {}: {}",
                output.status.return_code(),
                output.stderr.trim()
            ),
            Err(e) => warn!("mamba info failed: {e}"),
        }
    }

    /// The `env create` invocation for one definition
    pub fn create_command(&self, name: &str, definition: &Path, log_path: &Path) -> ProcessCommand {
        let mut args: Vec<String> = vec!["env".into(), "create".into()];
        if self.settings.mode.is_force() {
            args.push("-y".into());
        }
        if self.settings.offline {
            args.push("--offline".into());
        }
        args.extend([
            "-n".to_string(),
            name.to_string(),
            "-f".to_string(),
            definition.to_string_lossy().to_string(),
        ]);

        let builder = if self.settings.dry_run {
            ProcessCommandBuilder::new(DRY_RUN_PREFIX[0])
                .args(&DRY_RUN_PREFIX[1..])
                .arg(&self.settings.mamba.to_string_lossy())
        } else {
            ProcessCommandBuilder::new(&self.settings.mamba.to_string_lossy())
        };
        builder
            .args(args)
            .envs(&self.env)
            .isolated_env()
            .output_file(log_path)
            .build()
    }

    /// Validate and create the environment described by `definition`.
    ///
    /// Never fails the tier: every problem is recorded in the outcome.
    pub async fn deploy_env(&self, definition: &Path) -> EnvOutcome {
        let name = definition
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let outcome = |status, log_file| EnvOutcome {
            name: name.clone(),
            definition: definition.to_path_buf(),
            status,
            log_file,
        };
        debug!("dry_run={} mode={:?}", self.settings.dry_run, self.settings.mode);

        if let Err(e) = validate_env_yaml(self.fs, definition) {
            error!("invalid environment definition {}: {e}", definition.display());
            return outcome(EnvStatus::Invalid { reason: e.message }, None);
        }

        if self.settings.mode.is_keep() {
            let env_dir = self.envs_dir.join(&name);
            if self.fs.is_dir(&env_dir) {
                info!("using existing environment: {}", env_dir.display());
                return outcome(EnvStatus::Kept, None);
            }
        }

        let log_path = self
            .log_dir
            .join(format!("{}-{name}.log", Local::now().format("%Y%m%d-%H%M%S")));
        info!("log_path={}", log_path.display());
        let command = self.create_command(&name, definition, &log_path);
        debug!("mamba_command={}", command.display());

        let status = match self.runner.run(command).await {
            Ok(output) if output.status.success() => EnvStatus::Created,
            Ok(output) => {
                let return_code = output.status.return_code();
                error!("returncode={return_code} for {name}");
                EnvStatus::Failed { return_code }
            }
            Err(e) => {
                error!("cannot run package manager for {name}: {e}");
                EnvStatus::Errored {
                    message: e.to_string(),
                }
            }
        };
        outcome(status, Some(log_path))
    }

    fn base_command(&self) -> ProcessCommandBuilder {
        ProcessCommandBuilder::new(&self.settings.mamba.to_string_lossy())
            .envs(&self.env)
            .isolated_env()
    }
}

/// Variables that pin the package manager to the target's own directories
pub fn package_manager_env(target: &Path, envs_dir: &Path, channel: &str) -> BTreeMap<String, String> {
    let path = |p: &Path| p.to_string_lossy().to_string();
    BTreeMap::from([
        ("HOME".to_string(), path(&target.join("engine_home"))),
        ("CONDA_ENVS_DIRS".to_string(), path(envs_dir)),
        (
            "CONDA_PKGS_DIRS".to_string(),
            path(&target.join("conda_package_cache")),
        ),
        ("CONDA_CHANNELS".to_string(), channel.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFileSystem;
    use crate::subprocess::MockProcessRunner;

    const DEF: &str = "/res/defs/universal/conda.yaml";
    const VALID: &str = "channels: [conda-forge]\ndependencies: [python]\n";

    fn settings(mode: DeployMode, dry_run: bool, offline: bool) -> DeployerSettings {
        DeployerSettings {
            mamba: PathBuf::from("/opt/engine/bin/mamba"),
            target: PathBuf::from("/srv"),
            tier_path: PathBuf::from("/srv/infrastructure/blue"),
            channel: "conda-forge".to_string(),
            dry_run,
            offline,
            mode,
        }
    }

    fn fixture() -> (MemoryFileSystem, MockProcessRunner) {
        let fs = MemoryFileSystem::new();
        fs.add_dir("/srv/infrastructure/blue");
        fs.add_file(DEF, VALID);
        (fs, MockProcessRunner::new())
    }

    #[test]
    fn test_new_creates_log_dir_and_binds_env() {
        let (fs, mock) = fixture();
        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock), settings(DeployMode::Normal, false, false))
                .unwrap();

        assert!(fs.is_dir(Path::new("/srv/infrastructure/blue/logs")));
        let env = deployer.env();
        assert_eq!(env["HOME"], "/srv/engine_home");
        assert_eq!(env["CONDA_ENVS_DIRS"], "/srv/infrastructure/blue/conda/envs");
        assert_eq!(env["CONDA_PKGS_DIRS"], "/srv/conda_package_cache");
        assert_eq!(env["CONDA_CHANNELS"], "conda-forge");
    }

    #[test]
    fn test_create_command_shape() {
        let (fs, mock) = fixture();
        let log = Path::new("/srv/infrastructure/blue/logs/x.log");

        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock.clone()), settings(DeployMode::Normal, false, false))
                .unwrap();
        let command = deployer.create_command("conda", Path::new(DEF), log);
        assert_eq!(command.program, "/opt/engine/bin/mamba");
        assert_eq!(command.args, vec!["env", "create", "-n", "conda", "-f", DEF]);
        assert!(command.isolated_env);
        assert_eq!(command.output_file.as_deref(), Some(log));
        assert_eq!(command.env.len(), 4);

        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock), settings(DeployMode::Force, true, true)).unwrap();
        let command = deployer.create_command("conda", Path::new(DEF), log);
        assert_eq!(command.program, "/usr/bin/env");
        assert_eq!(
            command.args,
            vec![
                "echo",
                "/opt/engine/bin/mamba",
                "env",
                "create",
                "-y",
                "--offline",
                "-n",
                "conda",
                "-f",
                DEF
            ]
        );
    }

    #[tokio::test]
    async fn test_deploy_env_records_success_and_log_file() {
        let (fs, mut mock) = fixture();
        mock.expect_command("/opt/engine/bin/mamba")
            .with_args(|args| args.starts_with(&["env".to_string(), "create".to_string()]))
            .returns_success()
            .finish();

        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock.clone()), settings(DeployMode::Normal, false, false))
                .unwrap();
        let outcome = deployer.deploy_env(Path::new(DEF)).await;

        assert_eq!(outcome.name, "conda");
        assert_eq!(outcome.status, EnvStatus::Created);
        let log = outcome.log_file.unwrap();
        assert!(log.starts_with("/srv/infrastructure/blue/logs"));
        let file_name = log.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.ends_with("-conda.log"));
        assert_eq!(file_name.len(), "YYYYmmdd-HHMMSS-conda.log".len());
    }

    #[tokio::test]
    async fn test_deploy_env_log_holds_package_manager_output() {
        let (fs, mut mock) = fixture();
        mock.expect_command("/opt/engine/bin/mamba")
            .returns_stdout("Preparing transaction: done\n")
            .returns_stderr("PackagesNotFoundError: nosuchpkg\n")
            .returns_exit_code(1)
            .finish();
        let runner = mock.with_output_fs(Arc::new(fs.clone()));

        let deployer =
            MambaDeployer::new(&fs, Arc::new(runner), settings(DeployMode::Normal, false, false))
                .unwrap();
        let outcome = deployer.deploy_env(Path::new(DEF)).await;

        assert_eq!(outcome.status, EnvStatus::Failed { return_code: 1 });
        let log = fs.file_contents(outcome.log_file.unwrap()).unwrap();
        assert_eq!(
            log,
            "Preparing transaction: done\nPackagesNotFoundError: nosuchpkg\n"
        );
    }

    #[tokio::test]
    async fn test_deploy_env_records_nonzero_exit() {
        let (fs, mut mock) = fixture();
        mock.expect_command("/opt/engine/bin/mamba")
            .returns_exit_code(1)
            .finish();

        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock), settings(DeployMode::Normal, false, false))
                .unwrap();
        let outcome = deployer.deploy_env(Path::new(DEF)).await;

        assert_eq!(outcome.status, EnvStatus::Failed { return_code: 1 });
    }

    #[tokio::test]
    async fn test_keep_mode_skips_existing_environment() {
        let (fs, mock) = fixture();
        fs.add_dir("/srv/infrastructure/blue/conda/envs/conda");

        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock.clone()), settings(DeployMode::Keep, false, false))
                .unwrap();
        let outcome = deployer.deploy_env(Path::new(DEF)).await;

        assert_eq!(outcome.status, EnvStatus::Kept);
        assert!(mock.get_call_history().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_definition_is_skipped() {
        let (fs, mock) = fixture();
        fs.add_file("/res/defs/universal/broken.yaml", "channels: []\n");

        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock.clone()), settings(DeployMode::Normal, false, false))
                .unwrap();
        let outcome = deployer
            .deploy_env(Path::new("/res/defs/universal/broken.yaml"))
            .await;

        assert!(matches!(outcome.status, EnvStatus::Invalid { .. }));
        assert!(mock.get_call_history().is_empty());
    }

    #[tokio::test]
    async fn test_info_failure_is_not_fatal() {
        let (fs, mut mock) = fixture();
        mock.expect_command("/opt/engine/bin/mamba")
            .with_args(|args| args == ["info"])
            .returns_exit_code(2)
            .finish();

        let deployer =
            MambaDeployer::new(&fs, Arc::new(mock.clone()), settings(DeployMode::Keep, false, false))
                .unwrap();
        deployer.info().await;

        assert!(mock.verify_called("/opt/engine/bin/mamba", 1));
    }
}
