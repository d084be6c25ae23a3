//! Bulk loaders
//!
//! Builders that borrow an `Autograder` and append batches of test cases
//! sharing directory layout, prefixes and timeouts. Tests are appended in the
//! order they are added.

pub mod io;
pub mod realtime;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use io::{IoLayout, IoTestBulkLoader};
pub use realtime::RealtimeTestBulkLoader;

use crate::testcase::DEFAULT_HIDDEN_MSG;

/// A directory plus a filename prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    pub directory: PathBuf,
    pub prefix: String,
}

impl FileSet {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    /// `{directory}/{prefix}{name}`
    pub fn path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}{}", self.prefix, name))
    }

    pub fn in_dir(&self, directory: &Path) -> Self {
        Self::new(directory, self.prefix.clone())
    }
}

/// Per-test overrides accepted by `add_with` and `add_list`
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// Ignored by `add_list`, which takes points from the list
    pub point_value: f64,
    /// Prepended to the test name (after the loader's own prefix)
    pub prefix: String,
    /// Falls back to the loader's default
    pub timeout: Option<Duration>,
    pub hidden: bool,
    pub hidden_msg: String,
    pub early_stop: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            point_value: 1.0,
            prefix: String::new(),
            timeout: None,
            hidden: false,
            hidden_msg: DEFAULT_HIDDEN_MSG.to_string(),
            early_stop: false,
        }
    }
}

impl TestOptions {
    pub fn points(mut self, point_value: f64) -> Self {
        self.point_value = point_value;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn hidden(mut self, hidden_msg: impl Into<String>) -> Self {
        self.hidden = true;
        self.hidden_msg = hidden_msg.into();
        self
    }

    pub fn early_stop(mut self, early_stop: bool) -> Self {
        self.early_stop = early_stop;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_set_path() {
        let set = FileSet::new("/tests/in", "cmd-");
        assert_eq!(set.path("hw1-3"), PathBuf::from("/tests/in/cmd-hw1-3"));
    }

    #[test]
    fn test_options_defaults() {
        let opts = TestOptions::default();
        assert_eq!(opts.point_value, 1.0);
        assert_eq!(opts.hidden_msg, "hidden test");
        assert!(opts.timeout.is_none());
    }
}
