//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use tier_engine::config::{EngineConfig, EnginePaths};
use tier_engine::deploy::DeployContext;
use tier_engine::filesystem::{FileSystem, RealFileSystem};
use tier_engine::subprocess::{
    ExitStatus, ProcessCommand, ProcessError, ProcessOutput, ProcessRunner, SubprocessManager,
};

pub const VALID_ENV: &str = "\
channels:
  - conda-forge
dependencies:
  - python>=3.11
  - numpy
  - pip:
      - requests==2.32.3
";

/// Shell stand-in for mamba: creates the named environment under
/// `CONDA_ENVS_DIRS`. Uses absolute paths because it runs with no `PATH`.
pub const FAKE_MAMBA: &str = r#"#!/bin/sh
name=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-n" ]; then
    shift
    name="$1"
  fi
  shift
done
if [ -n "$name" ]; then
  /bin/mkdir -p "$CONDA_ENVS_DIRS/$name/conda-meta"
  echo "created $name"
fi
"#;

/// A temporary target root plus the resource tree the deployer reads
pub struct TestTarget {
    temp_dir: TempDir,
}

impl TestTarget {
    /// Resources with `conda.yaml` and `unix.yaml` under `defs/universal`,
    /// a `bin/` with a relative symlink, and an `etc/` file.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir_all(root.join("target"))?;

        let universal = root.join("resources/defs/universal");
        fs::create_dir_all(&universal)?;
        fs::write(universal.join("conda.yaml"), VALID_ENV)?;
        fs::write(universal.join("unix.yaml"), VALID_ENV)?;

        let bin = root.join("resources/bin");
        fs::create_dir_all(&bin)?;
        fs::write(bin.join("tier-activate"), "#!/bin/sh\n")?;
        std::os::unix::fs::symlink("tier-activate", bin.join("activate"))?;

        let etc = root.join("resources/etc");
        fs::create_dir_all(&etc)?;
        fs::write(etc.join("condarc"), "channels: [conda-forge]\n")?;

        let mamba = root.join("engine/bin/mamba");
        fs::create_dir_all(root.join("engine/bin"))?;
        fs::write(&mamba, FAKE_MAMBA)?;
        fs::set_permissions(&mamba, fs::Permissions::from_mode(0o755))?;

        Ok(Self { temp_dir })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn target(&self) -> PathBuf {
        self.root().join("target")
    }

    pub fn resources(&self) -> PathBuf {
        self.root().join("resources")
    }

    pub fn mamba(&self) -> PathBuf {
        self.root().join("engine/bin/mamba")
    }

    pub fn infrastructure(&self) -> PathBuf {
        self.target().join("infrastructure")
    }

    pub fn paths(&self) -> EnginePaths {
        EnginePaths::new(self.mamba(), self.resources())
    }

    /// Deploy context over the real filesystem with `runner` for processes
    pub fn context(&self, runner: Arc<dyn ProcessRunner>) -> DeployContext {
        DeployContext::new(
            Arc::new(PlentyOfSpace),
            SubprocessManager::new(runner),
            self.paths(),
            EngineConfig::default(),
        )
        .with_platform("linux")
    }
}

/// Runner that creates the environment directory instead of calling mamba,
/// and fails every other command the way a missing git repository would.
#[derive(Clone, Default)]
pub struct MaterializingRunner {
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

impl MaterializingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn created_environments(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|cmd| cmd.args.starts_with(&["env".to_string(), "create".to_string()]))
            .filter_map(|cmd| {
                let at = cmd.args.iter().position(|arg| arg == "-n")?;
                cmd.args.get(at + 1).cloned()
            })
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for MaterializingRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let output = |status, stdout: &str| ProcessOutput {
            status,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        };

        if command.program == "git" {
            return Ok(output(ExitStatus::Error(128), ""));
        }
        if command.program == "/usr/bin/env" {
            return Ok(output(ExitStatus::Success, &command.args[1..].join(" ")));
        }

        if let (Some(at), Some(envs)) = (
            command.args.iter().position(|arg| arg == "-n"),
            command.env.get("CONDA_ENVS_DIRS"),
        ) {
            if let Some(name) = command.args.get(at + 1) {
                fs::create_dir_all(Path::new(envs).join(name).join("conda-meta"))?;
            }
        }
        if let Some(log) = &command.output_file {
            fs::write(log, format!("{}\n", command.display()))?;
        }
        Ok(output(ExitStatus::Success, ""))
    }
}

/// The real filesystem with free space pinned high, so preflight passes on
/// small CI disks
#[derive(Debug, Default, Clone, Copy)]
pub struct PlentyOfSpace;

impl FileSystem for PlentyOfSpace {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        RealFileSystem.create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        RealFileSystem.remove_dir_all(path)
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()> {
        RealFileSystem.copy_tree(src, dst)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        RealFileSystem.symlink(target, link)
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        RealFileSystem.replace_symlink(target, link)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        RealFileSystem.read_link(path)
    }

    fn exists(&self, path: &Path) -> bool {
        RealFileSystem.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        RealFileSystem.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        RealFileSystem.is_file(path)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        RealFileSystem.is_symlink(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        RealFileSystem.read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        RealFileSystem.write(path, contents)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        RealFileSystem.read_dir(path)
    }

    fn available_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(1024 * 1024 * 1024 * 1024)
    }
}

/// Create `infrastructure/{blue,green}` with the given staging and
/// production links (relative, as the promoter writes them)
pub fn color_layout(infrastructure: &Path, staging: &str, production: Option<&str>) -> Result<()> {
    fs::create_dir_all(infrastructure.join("blue"))?;
    fs::create_dir_all(infrastructure.join("green"))?;
    std::os::unix::fs::symlink(staging, infrastructure.join("staging"))?;
    if let Some(production) = production {
        std::os::unix::fs::symlink(production, infrastructure.join("production"))?;
    }
    Ok(())
}

pub fn link_target(link: &Path) -> String {
    fs::read_link(link)
        .map(|target| target.to_string_lossy().to_string())
        .unwrap_or_default()
}
