//! Runner module - Command execution abstraction layer
//!
//! This module provides a unified interface for running grading commands:
//! - `CommandSpec`: what to run, where, with which stdin and time limit
//! - `RunOutcome`: raw exit status, captured streams and elapsed time
//! - `RunError`: spawn/IO failures and the distinguishable timeout signal
//! - `ShellRunner`: the default runner, executing through `sh -c`
//!
//! The runner module does NOT:
//! - Decide pass/fail (that's the test case's job)
//! - Know about sandboxes or test assets

pub mod shell;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use shell::ShellRunner;

/// How captured streams are compared against expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    /// Line endings are normalized before comparing
    #[default]
    Text,
    /// Byte-for-byte comparison
    Binary,
}

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell command line
    pub command: String,
    /// Interpreter used as `<interpreter> -c <command>` (defaults to the runner's shell)
    pub interpreter: Option<PathBuf>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
    /// Bytes fed to stdin; stdin is closed immediately when absent
    pub stdin: Option<Vec<u8>>,
    /// Wall-clock limit
    pub timeout: Duration,
    /// Whether stdout/stderr are captured or discarded
    pub capture_output: bool,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            interpreter: None,
            work_dir: None,
            stdin: None,
            timeout: Duration::from_secs(10),
            capture_output: true,
        }
    }

    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}

/// Outcome of a command that ran to completion
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Exit code; `128 + signal` when the process was killed by a signal
    pub exit_code: i32,
    /// Captured stdout (empty when not captured)
    pub stdout: Vec<u8>,
    /// Captured stderr (empty when not captured)
    pub stderr: Vec<u8>,
    /// Wall-clock running time
    pub running_time: Duration,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Compare captured stdout against expected bytes
    pub fn check_stdout(&self, expected: &[u8], mode: CompareMode) -> bool {
        streams_match(&self.stdout, expected, mode)
    }

    /// Compare captured stderr against expected bytes
    pub fn check_stderr(&self, expected: &[u8], mode: CompareMode) -> bool {
        streams_match(&self.stderr, expected, mode)
    }

    /// Compare captured stdout against the contents of a file
    pub async fn check_stdout_file(&self, path: &Path, mode: CompareMode) -> std::io::Result<bool> {
        let expected = tokio::fs::read(path).await?;
        Ok(self.check_stdout(&expected, mode))
    }

    /// Compare captured stderr against the contents of a file
    pub async fn check_stderr_file(&self, path: &Path, mode: CompareMode) -> std::io::Result<bool> {
        let expected = tokio::fs::read(path).await?;
        Ok(self.check_stderr(&expected, mode))
    }
}

/// Compare two streams under the given mode
pub fn streams_match(actual: &[u8], expected: &[u8], mode: CompareMode) -> bool {
    match mode {
        CompareMode::Binary => actual == expected,
        CompareMode::Text => normalize_newlines(actual) == normalize_newlines(expected),
    }
}

fn normalize_newlines(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' {
            if iter.peek() == Some(&&b'\n') {
                continue;
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}

/// Execution failures that are not a completed run
#[derive(Debug, Error)]
pub enum RunError {
    /// The command exceeded its time limit and was killed
    #[error("command `{command}` timed out (limit={limit:?})")]
    Timeout { command: String, limit: Duration },

    /// The interpreter could not be spawned
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Communication with the child failed
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunError::Timeout { .. })
    }
}

/// Runner trait for executing grading commands
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command to completion or until its time limit expires
    async fn run(&self, spec: &CommandSpec) -> Result<RunOutcome, RunError>;
}
