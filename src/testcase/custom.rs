//! Custom-function test: the caller decides pass/fail.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

use super::TestMeta;
use crate::core::TestResult;

/// Draft filled in by the check function, committed to the result afterwards
#[derive(Debug, Clone, Default)]
pub struct CustomReport {
    pub passed: bool,
    pub output: String,
}

pub type CustomFn = Arc<dyn Fn(&mut CustomReport) + Send + Sync>;

#[derive(Clone)]
pub struct CustomTest {
    func: CustomFn,
    /// The committed report, once executed
    pub report: Option<CustomReport>,
}

impl CustomTest {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut CustomReport) + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            report: None,
        }
    }

    pub(crate) fn execute(&mut self, meta: &TestMeta, result: &mut TestResult) {
        let mut draft = CustomReport::default();
        let func = Arc::clone(&self.func);

        if catch_unwind(AssertUnwindSafe(|| func(&mut draft))).is_err() {
            error!("Custom check {} panicked", meta.name);
            result.errored("Custom check function panicked.");
            self.report = Some(draft);
            return;
        }

        if draft.passed {
            result.pass(meta.points(), None);
        } else {
            result.fail(draft.output.clone(), None);
        }
        self.report = Some(draft);
    }
}

impl std::fmt::Debug for CustomTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomTest")
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}
