//! Realtime test bulk loader

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::TestOptions;
use crate::pipeline::Autograder;
use crate::runner::CompareMode;
use crate::testcase::{Generator, RealtimeTest, ReferencePolicy, TestCase};

pub struct RealtimeTestBulkLoader<'a> {
    autograder: &'a mut Autograder,
    generator: Arc<dyn Generator>,
    prefix: String,
    default_timeout: Duration,
    mode: CompareMode,
    reference_policy: ReferencePolicy,
}

impl<'a> RealtimeTestBulkLoader<'a> {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(autograder: &'a mut Autograder, generator: Arc<dyn Generator>) -> Self {
        Self {
            autograder,
            generator,
            prefix: String::new(),
            default_timeout: Self::DEFAULT_TIMEOUT,
            mode: CompareMode::Text,
            reference_policy: ReferencePolicy::default(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn binary_io(mut self, binary: bool) -> Self {
        self.mode = if binary {
            CompareMode::Binary
        } else {
            CompareMode::Text
        };
        self
    }

    pub fn reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference_policy = policy;
        self
    }

    /// Add one test whose generator id is `id`
    pub fn add(&mut self, name: &str, id: i64, point_value: f64) -> &mut Self {
        self.add_with(name, id, TestOptions::default().points(point_value))
    }

    pub fn add_with(&mut self, name: &str, id: i64, options: TestOptions) -> &mut Self {
        let test = RealtimeTest::new(Arc::clone(&self.generator), id)
            .with_interpreter(self.autograder.interpreter().map(Path::to_path_buf))
            .with_mode(self.mode)
            .with_reference_policy(self.reference_policy);

        let case = TestCase::realtime(format!("{}{}{}", self.prefix, options.prefix, name), test)
            .with_points(Some(options.point_value))
            .with_timeout(options.timeout.unwrap_or(self.default_timeout))
            .with_hidden(options.hidden, options.hidden_msg)
            .with_early_stop(options.early_stop);
        self.autograder.add_test(case);
        self
    }

    /// Add `(name, points)` pairs; generator ids are the 1-based list positions
    pub fn add_list(&mut self, tests: &[(&str, f64)], options: TestOptions) -> &mut Self {
        for (i, (name, point_value)) in tests.iter().enumerate() {
            self.add_with(name, i as i64 + 1, options.clone().points(*point_value));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AutograderOptions;
    use crate::testcase::{FnGenerator, TestKind};
    use tempfile::TempDir;

    #[test]
    fn test_add_list_assigns_ids_in_order() {
        let dir = TempDir::new().unwrap();
        let mut opts = AutograderOptions::new("RT", dir.path(), dir.path());
        opts.missing_files_check = false;
        let mut ag = Autograder::new(opts).unwrap();
        let generator = Arc::new(FnGenerator::new("noop", |_| Ok(())));

        ag.realtime_tests_bulk_loader(generator)
            .prefix("gen-")
            .reference_policy(ReferencePolicy::Fatal)
            .add_list(&[("x", 1.0), ("y", 2.0)], TestOptions::default());

        let cases = ag.test_cases();
        assert_eq!(cases[1].name, "RT: gen-y");
        assert_eq!(cases[1].timeout, Duration::from_secs(3));
        let ids: Vec<_> = cases
            .iter()
            .map(|t| match &t.kind {
                TestKind::Realtime(rt) => (rt.id, rt.reference_policy),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            ids,
            vec![(1, ReferencePolicy::Fatal), (2, ReferencePolicy::Fatal)]
        );
    }
}
