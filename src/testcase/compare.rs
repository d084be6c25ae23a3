//! Stream comparison shared by the I/O and realtime test kinds

use crate::runner::{streams_match, CompareMode, RunOutcome};

/// Which of the three observed streams matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamChecks {
    pub stdout: bool,
    pub stderr: bool,
    /// True when no exit status was expected
    pub exit_status: bool,
}

impl StreamChecks {
    pub fn all_passed(&self) -> bool {
        self.stdout && self.stderr && self.exit_status
    }
}

/// Everything a comparison test observed, kept for the report
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    /// Command line that was run
    pub command: String,
    /// Bytes fed to stdin
    pub input: Option<Vec<u8>>,
    /// `None` means the stream is not checked
    pub expected_stdout: Option<Vec<u8>>,
    pub expected_stderr: Option<Vec<u8>>,
    pub expected_exit_status: Option<i32>,
    /// Present once the command ran to completion
    pub outcome: Option<RunOutcome>,
    pub checks: Option<StreamChecks>,
}

impl Comparison {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Record the finished run and compare it against the expectations
    pub fn evaluate(&mut self, outcome: RunOutcome, mode: CompareMode) -> StreamChecks {
        let stdout = self
            .expected_stdout
            .as_deref()
            .map_or(true, |expected| streams_match(&outcome.stdout, expected, mode));
        let stderr = self
            .expected_stderr
            .as_deref()
            .map_or(true, |expected| streams_match(&outcome.stderr, expected, mode));
        let exit_status = self
            .expected_exit_status
            .map_or(true, |expected| expected == outcome.exit_code);

        let checks = StreamChecks {
            stdout,
            stderr,
            exit_status,
        };
        self.outcome = Some(outcome);
        self.checks = Some(checks);
        checks
    }

    /// One line per mismatching stream
    pub fn mismatch_summary(&self) -> String {
        let (Some(checks), Some(outcome)) = (&self.checks, &self.outcome) else {
            return String::new();
        };

        let mut lines = Vec::new();
        if !checks.stdout {
            lines.push("stdout mismatch".to_string());
        }
        if !checks.stderr {
            lines.push("stderr mismatch".to_string());
        }
        if !checks.exit_status {
            lines.push(format!(
                "exit status mismatch: expected {}, got {}",
                self.expected_exit_status.unwrap_or_default(),
                outcome.exit_code
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(stdout: &str, stderr: &str, exit_code: i32) -> RunOutcome {
        RunOutcome {
            exit_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_exit_status_mismatch_is_named() {
        let mut cmp = Comparison::new("./a.out");
        cmp.expected_stdout = Some(b"42\n".to_vec());
        cmp.expected_stderr = Some(Vec::new());
        cmp.expected_exit_status = Some(0);

        let checks = cmp.evaluate(outcome("42\n", "", 1), CompareMode::Text);

        assert!(checks.stdout);
        assert!(checks.stderr);
        assert!(!checks.exit_status);
        assert_eq!(
            cmp.mismatch_summary(),
            "exit status mismatch: expected 0, got 1"
        );
    }

    #[test]
    fn test_unset_expectations_are_skipped() {
        let mut cmp = Comparison::new("./a.out");
        let checks = cmp.evaluate(outcome("anything", "noise", 3), CompareMode::Text);

        assert!(checks.all_passed());
        assert!(cmp.mismatch_summary().is_empty());
    }

    #[test]
    fn test_stream_mismatches_listed_in_order() {
        let mut cmp = Comparison::new("./a.out");
        cmp.expected_stdout = Some(b"a".to_vec());
        cmp.expected_stderr = Some(b"b".to_vec());

        cmp.evaluate(outcome("x", "y", 0), CompareMode::Binary);
        assert_eq!(cmp.mismatch_summary(), "stdout mismatch\nstderr mismatch");
    }
}
