use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
    TimedOut,
    Errored,
}

impl TestState {
    /// Whether the state is one of the four terminal outcomes
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestState::Passed | TestState::Failed | TestState::TimedOut | TestState::Errored
        )
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestState::Pending => "pending",
            TestState::Running => "running",
            TestState::Passed => "passed",
            TestState::Failed => "failed",
            TestState::TimedOut => "timed_out",
            TestState::Errored => "errored",
        };
        write!(f, "{}", s)
    }
}
