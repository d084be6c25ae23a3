//! Basic command test: run a command in the submission sandbox and check its
//! exit status. The pipeline uses it for the build check.

use std::path::PathBuf;
use tracing::{debug, info};

use super::{ExecContext, TestMeta};
use crate::core::TestResult;
use crate::runner::{CommandSpec, RunError, RunOutcome};

#[derive(Debug, Clone)]
pub struct BasicTest {
    pub command: String,
    /// `None` accepts any exit status
    pub expected_retcode: Option<i32>,
    pub interpreter: Option<PathBuf>,
    /// Present once the command ran to completion
    pub outcome: Option<RunOutcome>,
}

impl BasicTest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            expected_retcode: Some(0),
            interpreter: None,
            outcome: None,
        }
    }

    pub fn with_expected_retcode(mut self, retcode: Option<i32>) -> Self {
        self.expected_retcode = retcode;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub(crate) async fn execute(
        &mut self,
        meta: &TestMeta,
        result: &mut TestResult,
        ctx: &ExecContext<'_>,
    ) {
        let spec = CommandSpec::new(&self.command)
            .with_interpreter(self.interpreter.clone())
            .with_work_dir(ctx.sandboxes.submission.work_dir())
            .with_timeout(meta.timeout);

        match ctx.runner.run(&spec).await {
            Ok(outcome) => {
                debug!("{} exited with {}", meta.name, outcome.exit_code);
                let running_time = Some(outcome.running_time);
                let exit_code = outcome.exit_code;
                self.outcome = Some(outcome);

                match self.expected_retcode {
                    Some(expected) if expected != exit_code => result.fail(
                        format!(
                            "exit status mismatch: expected {}, got {}",
                            expected, exit_code
                        ),
                        running_time,
                    ),
                    _ => result.pass(meta.points(), running_time),
                }
            }
            Err(RunError::Timeout { limit, .. }) => {
                info!("{} timed out (limit={:?})", meta.name, limit);
                result.time_out(limit);
            }
            Err(e) => result.errored(format!("{}", e)),
        }
    }
}
