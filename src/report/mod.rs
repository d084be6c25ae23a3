//! Report module - Turns executed test cases into a platform report
//!
//! - `Formatter`: renders every test case, computes the aggregate score
//! - `Truncator`: keeps each embedded stream inside its byte budget
//! - `diff`: line diff used by the HTML rendering
//!
//! The report module only reads test results; it never changes them.

pub mod diff;
pub mod formatter;
pub mod truncate;

pub use formatter::{
    BudgetPolicy, Formatter, FormatterOptions, HiddenPlacement, OutputFormat, Report, ReportTest,
};
pub use truncate::Truncator;
