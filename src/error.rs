//! Error types shared across the grading pipeline
//!
//! Only pipeline-fatal conditions and setup failures are errors. Everything a
//! single test can go through (mismatch, timeout, harness fault) is recorded in
//! that test's result instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that abort a grading run or prevent one from starting
#[derive(Debug, Error)]
pub enum GraderError {
    /// Reference build exited with a non-zero status
    #[error("{autograder} reference build failed with exit status {exit_code}")]
    ReferenceBuildFailed { autograder: String, exit_code: i32 },

    /// Reference build exceeded its time limit
    #[error("{autograder} reference build timed out (limit={limit:?})")]
    ReferenceBuildTimedOut { autograder: String, limit: Duration },

    /// Reference run of a realtime test timed out under the fatal policy
    #[error("reference run of {test} timed out (limit={limit:?})")]
    ReferenceRunTimedOut { test: String, limit: Duration },

    /// Could not create or populate a sandbox
    #[error("sandbox setup failed at {path}: {source}")]
    Sandbox {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid grading configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = GraderError> = std::result::Result<T, E>;
