//! Grading harness for student submissions
//!
//! An [`pipeline::Autograder`] copies a submission into a sandbox, runs an
//! ordered list of test cases against it and records one result per test.
//! [`report::Formatter`] turns the results into a size-bounded JSON report.

pub mod config;
pub mod core;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod sandbox;
pub mod testcase;

pub use error::{GraderError, Result};
pub use pipeline::{Autograder, AutograderOptions};
pub use report::{Formatter, FormatterOptions, Report};
