//! I/O test bulk loader

use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{FileSet, TestOptions};
use crate::pipeline::Autograder;
use crate::runner::CompareMode;
use crate::testcase::{IoTest, Source, TestCase};

/// Where each piece of an I/O test lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoLayout {
    pub commands: FileSet,
    pub input: FileSet,
    pub expected_stdout: FileSet,
    pub expected_stderr: FileSet,
    pub expected_exit_status: FileSet,
}

impl IoLayout {
    /// Commands and inputs under `tests/in`, expectations under `tests/exp`
    pub fn under(tests_path: &Path) -> Self {
        let input_dir = tests_path.join("in");
        let expected_dir = tests_path.join("exp");
        Self {
            commands: FileSet::new(&input_dir, "cmd-"),
            input: FileSet::new(&input_dir, "in-"),
            expected_stdout: FileSet::new(&expected_dir, "out-"),
            expected_stderr: FileSet::new(&expected_dir, "err-"),
            expected_exit_status: FileSet::new(&expected_dir, "code-"),
        }
    }
}

pub struct IoTestBulkLoader<'a> {
    autograder: &'a mut Autograder,
    layout: IoLayout,
    prefix: String,
    default_timeout: Duration,
    mode: CompareMode,
}

impl<'a> IoTestBulkLoader<'a> {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(autograder: &'a mut Autograder) -> Self {
        let layout = IoLayout::under(autograder.tests_path());
        Self {
            autograder,
            layout,
            prefix: String::new(),
            default_timeout: Self::DEFAULT_TIMEOUT,
            mode: CompareMode::Text,
        }
    }

    pub fn layout(mut self, layout: IoLayout) -> Self {
        self.layout = layout;
        self
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

    pub fn add(&mut self, name: &str, point_value: f64) -> &mut Self {
        self.add_with(name, TestOptions::default().points(point_value))
    }

    pub fn add_with(&mut self, name: &str, options: TestOptions) -> &mut Self {
        let file_name = format!("{}{}{}", self.prefix, options.prefix, name);
        let layout = &self.layout;
        debug!("Loading I/O test {} from {:?}", file_name, layout.commands.directory);

        let test = IoTest::new(Source::File(layout.commands.path(&file_name)))
            .with_input(Source::OptionalFile(layout.input.path(&file_name)))
            .with_expected_stdout(Source::OptionalFile(layout.expected_stdout.path(&file_name)))
            .with_expected_stderr(Source::OptionalFile(layout.expected_stderr.path(&file_name)))
            .with_expected_exit_status(Source::OptionalFile(
                layout.expected_exit_status.path(&file_name),
            ))
            .with_mode(self.mode)
            .with_interpreter(self.autograder.interpreter().map(Path::to_path_buf));

        let case = TestCase::io(file_name, test)
            .with_points(Some(options.point_value))
            .with_timeout(options.timeout.unwrap_or(self.default_timeout))
            .with_hidden(options.hidden, options.hidden_msg)
            .with_early_stop(options.early_stop);
        self.autograder.add_test(case);
        self
    }

    /// Add `(name, points)` pairs sharing `options`
    pub fn add_list(&mut self, tests: &[(&str, f64)], options: TestOptions) -> &mut Self {
        for (name, point_value) in tests {
            self.add_with(name, options.clone().points(*point_value));
        }
        self
    }
}
