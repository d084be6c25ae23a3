//! I/O comparison test: fixed command, fixed stdin, expected streams loaded
//! from fixed locations. All-or-nothing scoring.

use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

use super::compare::Comparison;
use super::{ExecContext, TestMeta};
use crate::core::TestResult;
use crate::runner::{CommandSpec, CompareMode, RunError};

/// Where a command, an input or an expectation comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Literal(Vec<u8>),
    /// File that must exist
    File(PathBuf),
    /// File whose absence means "not configured"
    OptionalFile(PathBuf),
}

impl Source {
    pub fn literal(content: impl Into<Vec<u8>>) -> Self {
        Source::Literal(content.into())
    }

    /// Load the content; `Ok(None)` only for an absent optional file
    pub async fn load(&self) -> anyhow::Result<Option<Vec<u8>>> {
        match self {
            Source::Literal(bytes) => Ok(Some(bytes.clone())),
            Source::File(path) => tokio::fs::read(path)
                .await
                .map(Some)
                .with_context(|| format!("Failed to read {}", path.display())),
            Source::OptionalFile(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Ok(None);
                }
                tokio::fs::read(path)
                    .await
                    .map(Some)
                    .with_context(|| format!("Failed to read {}", path.display()))
            }
        }
    }
}

async fn load_optional(source: &Option<Source>) -> anyhow::Result<Option<Vec<u8>>> {
    match source {
        Some(source) => source.load().await,
        None => Ok(None),
    }
}

/// Parse an exit status written as text (surrounding whitespace allowed)
pub fn parse_exit_status(bytes: &[u8]) -> anyhow::Result<i32> {
    let text = String::from_utf8_lossy(bytes);
    text.trim()
        .parse::<i32>()
        .with_context(|| format!("Invalid exit status: {:?}", text.trim()))
}

#[derive(Debug, Clone)]
pub struct IoTest {
    pub command: Source,
    pub input: Option<Source>,
    pub expected_stdout: Option<Source>,
    pub expected_stderr: Option<Source>,
    pub expected_exit_status: Option<Source>,
    pub mode: CompareMode,
    pub interpreter: Option<PathBuf>,
    /// Filled in during execution
    pub comparison: Option<Comparison>,
}

impl IoTest {
    pub fn new(command: Source) -> Self {
        Self {
            command,
            input: None,
            expected_stdout: None,
            expected_stderr: None,
            expected_exit_status: None,
            mode: CompareMode::Text,
            interpreter: None,
            comparison: None,
        }
    }

    pub fn with_input(mut self, input: Source) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_expected_stdout(mut self, expected: Source) -> Self {
        self.expected_stdout = Some(expected);
        self
    }

    pub fn with_expected_stderr(mut self, expected: Source) -> Self {
        self.expected_stderr = Some(expected);
        self
    }

    pub fn with_expected_exit_status(mut self, expected: Source) -> Self {
        self.expected_exit_status = Some(expected);
        self
    }

    pub fn with_mode(mut self, mode: CompareMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Resolve command, input and expectations into a fresh comparison
    async fn prepare(&self) -> anyhow::Result<Comparison> {
        let command = self
            .command
            .load()
            .await?
            .context("Test command is not configured")?;
        let mut cmp = Comparison::new(String::from_utf8_lossy(&command).trim());
        cmp.input = load_optional(&self.input).await?;
        cmp.expected_stdout = load_optional(&self.expected_stdout).await?;
        cmp.expected_stderr = load_optional(&self.expected_stderr).await?;
        cmp.expected_exit_status = match load_optional(&self.expected_exit_status).await? {
            Some(bytes) => Some(parse_exit_status(&bytes)?),
            None => None,
        };
        Ok(cmp)
    }

    pub(crate) async fn execute(
        &mut self,
        meta: &TestMeta,
        result: &mut TestResult,
        ctx: &ExecContext<'_>,
    ) {
        let mut cmp = match self.prepare().await {
            Ok(cmp) => cmp,
            Err(e) => {
                result.errored(format!("{:#}", e));
                return;
            }
        };

        let mut spec = CommandSpec::new(&cmp.command)
            .with_interpreter(self.interpreter.clone())
            .with_work_dir(ctx.sandboxes.submission.work_dir())
            .with_timeout(meta.timeout);
        if let Some(input) = &cmp.input {
            spec = spec.with_stdin(input.clone());
        }

        match ctx.runner.run(&spec).await {
            Ok(outcome) => {
                let running_time = Some(outcome.running_time);
                let checks = cmp.evaluate(outcome, self.mode);
                if checks.all_passed() {
                    result.pass(meta.points(), running_time);
                } else {
                    result.fail(cmp.mismatch_summary(), running_time);
                }
            }
            Err(RunError::Timeout { limit, .. }) => {
                info!("{} timed out (limit={:?})", meta.name, limit);
                result.time_out(limit);
            }
            Err(e) => result.errored(format!("{}", e)),
        }

        self.comparison = Some(cmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TestState;
    use crate::runner::ShellRunner;
    use crate::sandbox::{SandboxConfig, SandboxPair};
    use crate::testcase::{TestCase, TestKind};
    use std::time::Duration;

    async fn run(test: IoTest) -> TestCase {
        let sandboxes = SandboxPair::new(&SandboxConfig::default(), "").unwrap();
        let runner = ShellRunner::new();
        let ctx = ExecContext {
            runner: &runner,
            sandboxes: &sandboxes,
        };
        let mut case = TestCase::io("io", test)
            .with_points(Some(2.0))
            .with_timeout(Duration::from_secs(5));
        case.execute(&ctx).await.unwrap();
        case
    }

    #[tokio::test]
    async fn test_matching_streams_pass() {
        let test = IoTest::new(Source::literal("read x; echo hello_$x"))
            .with_input(Source::literal("123\n"))
            .with_expected_stdout(Source::literal("hello_123\n"))
            .with_expected_stderr(Source::literal(""))
            .with_expected_exit_status(Source::literal("0\n"));

        let case = run(test).await;
        assert_eq!(case.result.state, TestState::Passed);
        assert_eq!(case.result.score, 2.0);
    }

    #[tokio::test]
    async fn test_exit_status_mismatch_fails() {
        let test = IoTest::new(Source::literal("echo ok; exit 1"))
            .with_expected_stdout(Source::literal("ok\n"))
            .with_expected_stderr(Source::literal(""))
            .with_expected_exit_status(Source::literal("0"));

        let case = run(test).await;
        assert_eq!(case.result.state, TestState::Failed);
        assert_eq!(case.result.score, 0.0);
        assert!(case
            .result
            .message
            .as_deref()
            .unwrap()
            .contains("exit status mismatch: expected 0, got 1"));
    }

    #[tokio::test]
    async fn test_missing_exit_expectation_is_skipped() {
        let test = IoTest::new(Source::literal("echo ok; exit 7"))
            .with_expected_stdout(Source::literal("ok\n"));

        let case = run(test).await;
        assert_eq!(case.result.state, TestState::Passed);
    }

    #[tokio::test]
    async fn test_timeout_skips_comparison() {
        let test = IoTest::new(Source::literal("sleep 5"))
            .with_expected_stdout(Source::literal(""));
        let sandboxes = SandboxPair::new(&SandboxConfig::default(), "").unwrap();
        let runner = ShellRunner::new();
        let ctx = ExecContext {
            runner: &runner,
            sandboxes: &sandboxes,
        };
        let mut case = TestCase::io("slow", test).with_timeout(Duration::from_millis(200));
        case.execute(&ctx).await.unwrap();

        assert_eq!(case.result.state, TestState::TimedOut);
        assert!(case.result.timed_out);
        let TestKind::Io(io) = &case.kind else {
            panic!("expected io test");
        };
        assert!(io.comparison.as_ref().unwrap().checks.is_none());
    }

    #[tokio::test]
    async fn test_missing_required_file_errors() {
        let test = IoTest::new(Source::File("/nonexistent/cmd-1".into()));

        let case = run(test).await;
        assert_eq!(case.result.state, TestState::Errored);
        assert!(case.result.error);
    }

    #[tokio::test]
    async fn test_absent_optional_expectation_is_skipped() {
        let test = IoTest::new(Source::literal("echo anything"))
            .with_expected_stdout(Source::OptionalFile("/nonexistent/out-1".into()));

        let case = run(test).await;
        assert_eq!(case.result.state, TestState::Passed);
    }

    #[test]
    fn test_parse_exit_status() {
        assert_eq!(parse_exit_status(b" 3\n").unwrap(), 3);
        assert!(parse_exit_status(b"three").is_err());
    }
}
