use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::builder::ProcessCommandBuilder;
use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessOutput, ProcessRunner};

/// Read-only git queries used to stamp a tier with its source revision
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// `git rev-parse <rev>`; returns stdout verbatim
    async fn rev_parse(&self, repo: &Path, rev: &str) -> Result<String, ProcessError>;

    /// `git describe --dirty [options]`; returns stdout verbatim
    async fn describe(&self, repo: &Path, options: &[&str]) -> Result<String, ProcessError>;
}

pub struct GitRunnerImpl {
    runner: Arc<dyn ProcessRunner>,
}

/// Translate a non-success exit status into an error carrying git's stderr
#[inline]
fn check_command_success(output: &ProcessOutput) -> Result<(), ProcessError> {
    match &output.status {
        ExitStatus::Success => Ok(()),
        ExitStatus::Signal(signal) => Err(ProcessError::Signal(*signal)),
        other => Err(ProcessError::Failed {
            code: other.code().unwrap_or(1),
            stderr: output.stderr.trim().to_string(),
        }),
    }
}

impl GitRunnerImpl {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl GitRunner for GitRunnerImpl {
    async fn rev_parse(&self, repo: &Path, rev: &str) -> Result<String, ProcessError> {
        let output = self
            .runner
            .run(
                ProcessCommandBuilder::new("git")
                    .args(["rev-parse", rev])
                    .current_dir(repo)
                    .build(),
            )
            .await?;

        check_command_success(&output)?;
        Ok(output.stdout)
    }

    async fn describe(&self, repo: &Path, options: &[&str]) -> Result<String, ProcessError> {
        let output = self
            .runner
            .run(
                ProcessCommandBuilder::new("git")
                    .args(["describe", "--dirty"])
                    .args(options)
                    .current_dir(repo)
                    .build(),
            )
            .await?;

        check_command_success(&output)?;
        Ok(output.stdout)
    }
}
