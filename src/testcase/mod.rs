//! Test case module - the closed set of test kinds and their shared contract
//!
//! Every test case carries the same identity fields (name, points, timeout,
//! hidden flag, early stop) and a `TestResult` that starts `Pending`. The
//! kind-specific logic lives in the submodules:
//! - `basic`: run a command and check its exit status (used for the build check)
//! - `io`: run a command with fixed stdin and compare all three streams
//! - `custom`: delegate to a caller-supplied function
//! - `realtime`: generate the input, build the expectation from a reference run
//!
//! Only pipeline-fatal conditions leave `execute` as an `Err`; everything else
//! is a terminal state of the test's own result.

pub mod basic;
pub mod compare;
pub mod custom;
pub mod generator;
pub mod io;
pub mod realtime;

use std::time::Duration;
use tracing::{info, warn};

use crate::core::TestResult;
use crate::error::Result;
use crate::runner::Runner;
use crate::sandbox::SandboxPair;

pub use basic::BasicTest;
pub use compare::{Comparison, StreamChecks};
pub use custom::{CustomReport, CustomTest};
pub use generator::{FnGenerator, GeneratedFile, Generator, GeneratorContext, ProcessGenerator};
pub use io::{IoTest, Source};
pub use realtime::{RealtimeTest, ReferencePolicy};

/// Message shown instead of diagnostics for hidden tests
pub const DEFAULT_HIDDEN_MSG: &str = "hidden test";

/// Timeout used when none is given
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pipeline role of a test; failing a non-regular test aborts the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestRole {
    #[default]
    Regular,
    MissingFiles,
    Build,
}

/// Kind-specific part of a test case
pub enum TestKind {
    Basic(BasicTest),
    Io(IoTest),
    Custom(CustomTest),
    Realtime(RealtimeTest),
}

impl TestKind {
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::Basic(_) => "basic",
            TestKind::Io(_) => "io",
            TestKind::Custom(_) => "custom",
            TestKind::Realtime(_) => "realtime",
        }
    }
}

impl std::fmt::Debug for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Borrowed environment a test executes in
pub struct ExecContext<'a> {
    pub runner: &'a dyn Runner,
    pub sandboxes: &'a SandboxPair,
}

/// Identity fields handed to the kind-specific execution
#[derive(Debug, Clone)]
pub struct TestMeta {
    pub name: String,
    pub point_value: Option<f64>,
    pub timeout: Duration,
}

impl TestMeta {
    /// Points awarded on a pass
    pub fn points(&self) -> f64 {
        self.point_value.unwrap_or(0.0)
    }
}

#[derive(Debug)]
pub struct TestCase {
    pub name: String,
    /// `None` for tests that carry no points at all
    pub point_value: Option<f64>,
    pub timeout: Duration,
    pub hidden: bool,
    pub hidden_msg: String,
    pub early_stop: bool,
    pub role: TestRole,
    pub kind: TestKind,
    pub result: TestResult,
}

impl TestCase {
    pub fn new(name: impl Into<String>, kind: TestKind) -> Self {
        Self {
            name: name.into(),
            point_value: Some(1.0),
            timeout: DEFAULT_TIMEOUT,
            hidden: false,
            hidden_msg: DEFAULT_HIDDEN_MSG.to_string(),
            early_stop: false,
            role: TestRole::Regular,
            kind,
            result: TestResult::new(),
        }
    }

    pub fn basic(name: impl Into<String>, test: BasicTest) -> Self {
        Self::new(name, TestKind::Basic(test))
    }

    pub fn io(name: impl Into<String>, test: IoTest) -> Self {
        Self::new(name, TestKind::Io(test))
    }

    pub fn custom(name: impl Into<String>, test: CustomTest) -> Self {
        Self::new(name, TestKind::Custom(test))
    }

    pub fn realtime(name: impl Into<String>, test: RealtimeTest) -> Self {
        Self::new(name, TestKind::Realtime(test))
    }

    pub fn with_points(mut self, point_value: Option<f64>) -> Self {
        self.point_value = point_value;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hidden(mut self, hidden: bool, hidden_msg: impl Into<String>) -> Self {
        self.hidden = hidden;
        self.hidden_msg = hidden_msg.into();
        self
    }

    pub fn with_early_stop(mut self, early_stop: bool) -> Self {
        self.early_stop = early_stop;
        self
    }

    pub fn with_role(mut self, role: TestRole) -> Self {
        self.role = role;
        self
    }

    /// Whether failing this test stops the pipeline
    pub fn aborts_on_failure(&self) -> bool {
        self.early_stop || self.role != TestRole::Regular
    }

    /// Run the test once, moving its result through `RUNNING` to a terminal state
    pub async fn execute(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let meta = TestMeta {
            name: self.name.clone(),
            point_value: self.point_value,
            timeout: self.timeout,
        };
        let result = &mut self.result;
        result.start();

        let outcome = match &mut self.kind {
            TestKind::Basic(test) => {
                test.execute(&meta, result, ctx).await;
                Ok(())
            }
            TestKind::Io(test) => {
                test.execute(&meta, result, ctx).await;
                Ok(())
            }
            TestKind::Custom(test) => {
                test.execute(&meta, result);
                Ok(())
            }
            TestKind::Realtime(test) => test.execute(&meta, result, ctx).await,
        };

        if outcome.is_ok() && !result.is_finished() {
            warn!("{} finished without a verdict", meta.name);
            result.errored("Test case finished without a verdict.");
        }

        info!(
            "{}: {} ({}/{})",
            meta.name,
            result.state,
            result.score,
            meta.points()
        );
        outcome
    }
}
