//! Scripted [`ProcessRunner`] for tests
//!
//! Expectations answer calls in registration order: the first one whose
//! program and argument predicate match wins. A command with an
//! `output_file` gets its scripted stdout and stderr written to that file
//! through the attached [`FileSystem`], and comes back with both streams
//! empty, as it would from [`TokioProcessRunner`](super::TokioProcessRunner).

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};
use crate::filesystem::FileSystem;

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct MockProcessRunner {
    state: Arc<Mutex<MockState>>,
    output_fs: Option<Arc<dyn FileSystem>>,
}

#[derive(Default)]
struct MockState {
    expectations: Vec<Expectation>,
    history: Vec<ProcessCommand>,
}

struct Expectation {
    program: String,
    args: Option<ArgsMatcher>,
    response: ProcessOutput,
    calls: usize,
    limit: Option<usize>,
}

impl Expectation {
    fn matches(&self, command: &ProcessCommand) -> bool {
        self.program == command.program
            && self.args.as_ref().map_or(true, |matcher| matcher(&command.args))
    }
}

/// Builder for one expectation; registered by [`MockCommandConfig::finish`]
pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: Expectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write redirected command output into `fs` instead of dropping it
    pub fn with_output_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.output_fs = Some(fs);
        self
    }

    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: Expectation {
                program: program.to_string(),
                args: None,
                response: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::from_millis(10),
                },
                calls: 0,
                limit: None,
            },
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        self.calls_to(program).len() == times
    }

    /// Arguments of every call to `program`, in call order
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.lock()
            .history
            .iter()
            .filter(|cmd| cmd.program == program)
            .map(|cmd| cmd.args.clone())
            .collect()
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.lock().history.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn answer(&self, command: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let mut state = self.lock();
        state.history.push(command.clone());

        let expectation = state
            .expectations
            .iter_mut()
            .find(|expectation| expectation.matches(command))
            .ok_or_else(|| {
                ProcessError::MockExpectationNotMet(format!(
                    "no expectation for {}",
                    command.display()
                ))
            })?;

        expectation.calls += 1;
        match expectation.limit {
            Some(limit) if expectation.calls > limit => {
                Err(ProcessError::MockExpectationNotMet(format!(
                    "{} called {} times, expected {limit}",
                    command.program, expectation.calls
                )))
            }
            _ => Ok(expectation.response.clone()),
        }
    }

    fn redirect(&self, path: &Path, mut output: ProcessOutput) -> Result<ProcessOutput, ProcessError> {
        if let Some(fs) = &self.output_fs {
            let combined = format!("{}{}", output.stdout, output.stderr);
            fs.write(path, combined.as_bytes())
                .map_err(|source| ProcessError::OutputFile {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        output.stdout.clear();
        output.stderr.clear();
        Ok(output)
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let output = self.answer(&command)?;
        match &command.output_file {
            Some(path) => self.redirect(path, output),
            None => Ok(output),
        }
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.response.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.response.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response.status = match code {
            0 => ExitStatus::Success,
            code => ExitStatus::Error(code),
        };
        self
    }

    pub fn returns_success(self) -> Self {
        self.returns_exit_code(0)
    }

    /// Fail any call beyond the `n`th
    pub fn times(mut self, n: usize) -> Self {
        self.expectation.limit = Some(n);
        self
    }

    pub fn finish(self) {
        self.runner.lock().expectations.push(self.expectation);
    }
}
