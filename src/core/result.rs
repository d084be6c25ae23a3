//! Per-test result record and its state machine
//!
//! A result starts `Pending`, moves to `Running` when its test begins, and is
//! finished exactly once with one of the terminal states. Finishing twice is
//! ignored with a warning so a buggy callback cannot overwrite a verdict.

use std::time::Duration;
use tracing::warn;

use super::verdict::TestState;

#[derive(Debug, Clone, Default)]
pub struct TestResult {
    /// Awarded points
    pub score: f64,
    pub passed: bool,
    pub timed_out: bool,
    pub error: bool,
    /// Running time of the graded process, when one ran to completion
    pub running_time: Option<Duration>,
    /// False after the pipeline finishes means the test was skipped by an abort
    pub has_run: bool,
    pub state: TestState,
    /// Short human-readable diagnostic (mismatch summary, error cause, ...)
    pub message: Option<String>,
}

impl TestResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// `PENDING -> RUNNING`
    pub fn start(&mut self) {
        if self.state != TestState::Pending {
            warn!("Test started twice (state={})", self.state);
            return;
        }
        self.has_run = true;
        self.state = TestState::Running;
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// `RUNNING -> PASSED`, awarding `points`
    pub fn pass(&mut self, points: f64, running_time: Option<Duration>) {
        if self.ensure_open(TestState::Passed) {
            self.passed = true;
            self.score = points;
            self.running_time = running_time;
        }
    }

    /// `RUNNING -> FAILED`
    pub fn fail(&mut self, message: impl Into<String>, running_time: Option<Duration>) {
        if self.ensure_open(TestState::Failed) {
            self.message = Some(message.into());
            self.running_time = running_time;
        }
    }

    /// `RUNNING -> TIMED_OUT`
    pub fn time_out(&mut self, limit: Duration) {
        if self.ensure_open(TestState::TimedOut) {
            self.timed_out = true;
            self.message = Some(format!("Test case timed out with limit = {:?}.", limit));
        }
    }

    /// `RUNNING -> ERRORED`
    pub fn errored(&mut self, message: impl Into<String>) {
        if self.ensure_open(TestState::Errored) {
            self.error = true;
            self.message = Some(message.into());
        }
    }

    fn ensure_open(&mut self, next: TestState) -> bool {
        if self.state != TestState::Running {
            warn!(
                "Ignoring transition to {} from state {}",
                next, self.state
            );
            return false;
        }
        self.state = next;
        true
    }
}
