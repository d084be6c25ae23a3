use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::diff::html_table;
use super::truncate::Truncator;
use crate::core::TestResult;
use crate::error::Result;
use crate::pipeline::Autograder;
use crate::testcase::{BasicTest, Comparison, CustomTest, TestCase, TestKind};

pub const NOT_RUN: &str = "This test was not run.";
pub const RUNTIME_ERROR: &str =
    "Unexpected autograder runtime error! Please notify your instructors.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Html,
    SimpleFormat,
}

/// Whether a hidden test's placeholder goes through truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenPlacement {
    #[default]
    BeforeTruncation,
    AfterTruncation,
}

/// Derivation of the per-test byte budget from the host's payload limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    pub payload_limit: usize,
    pub reserved: usize,
    /// Headroom for JSON escaping and duplicated fields
    pub divisor: usize,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            payload_limit: 1 << 30,
            reserved: 10_000,
            divisor: 3,
        }
    }
}

impl BudgetPolicy {
    pub fn per_test_limit(&self, num_tests: usize) -> usize {
        self.payload_limit.saturating_sub(self.reserved) / num_tests.max(1) / self.divisor.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTest {
    pub name: String,
    pub points: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_points: Option<f64>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub gradable: bool,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_visibility: Option<String>,
    pub tests: Vec<ReportTest>,
}

impl Report {
    /// Write the report as JSON, creating missing parent directories
    pub async fn export(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(self).context("Failed to serialize report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FormatterOptions {
    pub message: Option<String>,
    pub visibility: Option<String>,
    pub stdout_visibility: Option<String>,
    /// Visibility attached to hidden tests
    pub hidden_tests_visibility: Option<String>,
    pub hide_points: bool,
    pub verbose: bool,
    pub html_diff: bool,
    pub hidden_placement: HiddenPlacement,
    pub budget: BudgetPolicy,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            message: None,
            visibility: Some("visible".to_string()),
            stdout_visibility: Some("hidden".to_string()),
            hidden_tests_visibility: Some("hidden".to_string()),
            hide_points: false,
            verbose: true,
            html_diff: false,
            hidden_placement: HiddenPlacement::default(),
            budget: BudgetPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Formatter {
    pub options: FormatterOptions,
}

impl Formatter {
    pub fn new(options: FormatterOptions) -> Self {
        Self { options }
    }

    /// Format the tests of several autograders into one report
    pub fn format_autograders(&self, autograders: &[Autograder]) -> Report {
        self.format(autograders.iter().flat_map(|ag| ag.test_cases()))
    }

    pub fn format<'a>(&self, tests: impl IntoIterator<Item = &'a TestCase>) -> Report {
        info!("Formatter running...");
        let tests: Vec<&TestCase> = tests.into_iter().collect();
        let truncator = Truncator::new(self.options.budget.per_test_limit(tests.len()));

        let awarded: f64 = tests.iter().map(|t| t.result.score).sum();
        let possible: f64 = tests.iter().filter_map(|t| t.point_value).sum();
        let score = if self.options.hide_points || possible <= 0.0 {
            0.0
        } else {
            awarded / possible
        };

        let report = Report {
            gradable: true,
            score,
            message: self.options.message.clone(),
            visibility: self.options.visibility.clone(),
            stdout_visibility: self.options.stdout_visibility.clone(),
            tests: tests.iter().map(|t| self.format_test(t, &truncator)).collect(),
        };
        info!("Formatter execution completed.");
        report
    }

    fn format_test(&self, test: &TestCase, t: &Truncator) -> ReportTest {
        let mut item = ReportTest {
            name: test.name.clone(),
            points: test.result.score,
            max_points: test.point_value,
            output: String::new(),
            output_format: None,
            message: None,
            visibility: None,
        };

        if test.hidden {
            item.output = match self.options.hidden_placement {
                HiddenPlacement::BeforeTruncation => t.truncate(&test.hidden_msg),
                HiddenPlacement::AfterTruncation => test.hidden_msg.clone(),
            };
            item.visibility = self.options.hidden_tests_visibility.clone();
            return item;
        }

        let (output, output_format) = match &test.kind {
            TestKind::Basic(basic) => (self.format_basic(test, basic, t), None),
            TestKind::Custom(custom) => (self.format_custom(test, custom, t), None),
            TestKind::Io(io) => self.format_comparison(test, io.comparison.as_ref(), t),
            TestKind::Realtime(rt) => self.format_comparison(test, rt.comparison.as_ref(), t),
        };
        item.output = output;
        item.output_format = output_format;
        item.message = test.result.message.as_deref().map(|m| t.truncate(m));
        item
    }

    fn format_basic(&self, test: &TestCase, basic: &BasicTest, t: &Truncator) -> String {
        let result = &test.result;
        if !result.has_run {
            return NOT_RUN.to_string();
        }
        let Some(outcome) = &basic.outcome else {
            return failure_text(result, t);
        };

        let mut summary = vec![
            "=== test command ===".to_string(),
            t.truncate(&basic.command),
            "=== exit status ===".to_string(),
            outcome.exit_code.to_string(),
        ];
        if self.options.verbose {
            summary.push("=== stdout ===".to_string());
            summary.push(t.truncate_bytes(&outcome.stdout));
            summary.push("=== stderr ===".to_string());
            summary.push(t.truncate_bytes(&outcome.stderr));
        }
        summary.join("\n")
    }

    fn format_custom(&self, test: &TestCase, custom: &CustomTest, t: &Truncator) -> String {
        let result = &test.result;
        if !result.has_run {
            return NOT_RUN.to_string();
        }
        if result.error {
            return failure_text(result, t);
        }
        custom
            .report
            .as_ref()
            .map(|report| t.truncate(&report.output))
            .unwrap_or_default()
    }

    fn format_comparison(
        &self,
        test: &TestCase,
        cmp: Option<&Comparison>,
        t: &Truncator,
    ) -> (String, Option<OutputFormat>) {
        let result = &test.result;
        let simple = Some(OutputFormat::SimpleFormat);
        if !result.has_run {
            return (NOT_RUN.to_string(), simple);
        }

        let Some(cmp) = cmp else {
            return (failure_text(result, t), simple);
        };
        if self.options.html_diff && cmp.outcome.is_some() {
            return (html_output(cmp, t), Some(OutputFormat::Html));
        }
        let Some(outcome) = cmp.outcome.as_ref().filter(|_| !result.error) else {
            return (failure_text(result, t), simple);
        };

        let status = if result.passed { "PASSED" } else { "FAILED" };
        let millis = result.running_time.unwrap_or_default().as_secs_f64() * 1000.0;
        let mut summary = vec![format!("{} in {:.2} ms.", status, millis)];

        if self.options.verbose {
            summary.push("=== test command ===".to_string());
            summary.push(t.truncate(&cmp.command));
            if let Some(input) = &cmp.input {
                summary.push("=== test input ===".to_string());
                summary.push(t.truncate_bytes(input));
            }
            summary.push("=== expected stdout ===".to_string());
            summary.push(expected_text(cmp.expected_stdout.as_deref(), t));
            summary.push("=== expected stderr ===".to_string());
            summary.push(expected_text(cmp.expected_stderr.as_deref(), t));
            summary.push("=== expected exit status ===".to_string());
            summary.push(
                cmp.expected_exit_status
                    .map_or_else(|| "(not checked)".to_string(), |c| c.to_string()),
            );
            if !result.passed {
                summary.push("=== your stdout ===".to_string());
                summary.push(t.truncate_bytes(&outcome.stdout));
                summary.push("=== your stderr ===".to_string());
                summary.push(t.truncate_bytes(&outcome.stderr));
                summary.push("=== your exit status ===".to_string());
                summary.push(outcome.exit_code.to_string());
            }
        } else if !result.passed {
            summary.push(cmp.mismatch_summary());
        }
        (summary.join("\n"), simple)
    }
}

fn expected_text(expected: Option<&[u8]>, t: &Truncator) -> String {
    expected.map_or_else(|| "(not checked)".to_string(), |bytes| t.truncate_bytes(bytes))
}

/// Rendering of a test that ended without a comparable run
fn failure_text(result: &TestResult, t: &Truncator) -> String {
    let message = result.message.as_deref().map(|m| t.truncate(m));
    if result.error {
        let mut lines = vec![format!("=== {} ===", RUNTIME_ERROR)];
        lines.extend(message);
        return lines.join("\n");
    }
    message.unwrap_or_default()
}

fn html_output(cmp: &Comparison, t: &Truncator) -> String {
    let Some(outcome) = &cmp.outcome else {
        return String::new();
    };
    let expected = |bytes: Option<&[u8]>| bytes.map(|b| t.truncate_bytes(b)).unwrap_or_default();
    let stdout_diff = html_table(
        &t.truncate_bytes(&outcome.stdout),
        &expected(cmp.expected_stdout.as_deref()),
        "Your stdout",
        "Expected stdout",
    );
    let stderr_diff = html_table(
        &t.truncate_bytes(&outcome.stderr),
        &expected(cmp.expected_stderr.as_deref()),
        "Your stderr",
        "Expected stderr",
    );
    format!(
        "<div><h2>exit status</h2>{}<hr><h2>stdout</h2>{}<hr><h2>stderr</h2>{}</div>",
        outcome.exit_code, stdout_diff, stderr_diff
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CompareMode, RunOutcome};
    use crate::testcase::{CustomReport, IoTest, Source};
    use std::time::Duration;

    fn custom(name: &str, points: Option<f64>, passed: Option<bool>) -> TestCase {
        let mut case = TestCase::custom(
            name,
            CustomTest::new(|_| {}),
        )
        .with_points(points);
        if let Some(passed) = passed {
            case.result.start();
            if passed {
                case.result.pass(points.unwrap_or(0.0), None);
            } else {
                case.result.fail("nope", None);
            }
            if let TestKind::Custom(test) = &mut case.kind {
                test.report = Some(CustomReport {
                    passed,
                    output: "custom output".to_string(),
                });
            }
        }
        case
    }

    fn failed_io() -> TestCase {
        let mut cmp = Comparison::new("./calc");
        cmp.input = Some(b"1 2\n".to_vec());
        cmp.expected_stdout = Some(b"3\n".to_vec());
        cmp.expected_exit_status = Some(0);
        cmp.evaluate(
            RunOutcome {
                exit_code: 1,
                stdout: b"4\n".to_vec(),
                running_time: Duration::from_millis(12),
                ..Default::default()
            },
            CompareMode::Text,
        );
        let mut io = IoTest::new(Source::literal("./calc"));
        io.comparison = Some(cmp);

        let mut case = TestCase::io("calc", io).with_points(Some(3.0));
        case.result.start();
        case.result.fail("stdout mismatch", Some(Duration::from_millis(12)));
        case
    }

    #[test]
    fn test_score_is_ratio_of_possible_points() {
        let tests = vec![
            custom("a", Some(2.0), Some(true)),
            custom("b", Some(3.0), Some(false)),
            custom("c", None, Some(true)),
        ];
        let report = Formatter::default().format(&tests);
        assert!((report.score - 0.4).abs() < 1e-9);
        assert_eq!(report.tests[0].points, 2.0);
        assert_eq!(report.tests[2].max_points, None);
    }

    #[test]
    fn test_hide_points_zeroes_only_the_aggregate() {
        let tests = vec![custom("a", Some(2.0), Some(true))];
        let formatter = Formatter::new(FormatterOptions {
            hide_points: true,
            ..Default::default()
        });
        let report = formatter.format(&tests);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.tests[0].points, 2.0);
        assert_eq!(tests[0].result.score, 2.0);
    }

    #[test]
    fn test_nothing_possible_scores_zero() {
        let tests = vec![custom("a", Some(0.0), Some(true))];
        assert_eq!(Formatter::default().format(&tests).score, 0.0);
    }

    #[test]
    fn test_unrun_and_hidden_tests() {
        let mut hidden = custom("secret", Some(1.0), Some(false));
        hidden.hidden = true;
        hidden.hidden_msg = "hidden test".to_string();
        let tests = vec![custom("skipped", Some(1.0), None), hidden];

        let report = Formatter::default().format(&tests);
        assert_eq!(report.tests[0].output, NOT_RUN);
        assert_eq!(report.tests[1].output, "hidden test");
        assert_eq!(report.tests[1].visibility.as_deref(), Some("hidden"));
        assert_eq!(report.tests[1].message, None);
    }

    #[test]
    fn test_verbose_io_output_lists_streams() {
        let tests = vec![failed_io()];
        let report = Formatter::default().format(&tests);
        let output = &report.tests[0].output;

        assert!(output.starts_with("FAILED in 12.00 ms."));
        assert!(output.contains("=== test input ===\n1 2\n"));
        assert!(output.contains("=== expected stderr ===\n(not checked)"));
        assert!(output.contains("=== your stdout ===\n4\n"));
        assert!(output.contains("=== your exit status ===\n1"));
        assert_eq!(report.tests[0].output_format, Some(OutputFormat::SimpleFormat));
    }

    #[test]
    fn test_terse_io_output_names_mismatches() {
        let tests = vec![failed_io()];
        let formatter = Formatter::new(FormatterOptions {
            verbose: false,
            ..Default::default()
        });
        let output = formatter.format(&tests).tests[0].output.clone();
        assert_eq!(
            output,
            "FAILED in 12.00 ms.\nstdout mismatch\nexit status mismatch: expected 0, got 1"
        );
    }

    #[test]
    fn test_html_diff_output() {
        let tests = vec![failed_io()];
        let formatter = Formatter::new(FormatterOptions {
            html_diff: true,
            ..Default::default()
        });
        let item = &formatter.format(&tests).tests[0];
        assert_eq!(item.output_format, Some(OutputFormat::Html));
        assert!(item.output.starts_with("<div><h2>exit status</h2>1<hr>"));
        assert!(item.output.contains("Expected stdout"));
    }

    #[test]
    fn test_errored_test_shows_runtime_error() {
        let mut case = custom("boom", Some(1.0), None);
        case.result.start();
        case.result.errored("Custom check function panicked.");
        let report = Formatter::default().format(&[case]);
        assert!(report.tests[0].output.contains(RUNTIME_ERROR));
    }

    #[test]
    fn test_budget_policy() {
        let budget = BudgetPolicy {
            payload_limit: 100_000,
            reserved: 10_000,
            divisor: 3,
        };
        assert_eq!(budget.per_test_limit(10), 3000);
        assert_eq!(budget.per_test_limit(0), 30_000);
        let alt = BudgetPolicy { divisor: 2, ..budget };
        assert_eq!(alt.per_test_limit(10), 4500);
    }

    #[test]
    fn test_hidden_placement_controls_truncation() {
        let mut case = custom("h", Some(1.0), Some(true));
        case.hidden = true;
        case.hidden_msg = "m".repeat(200);
        let tests = vec![case];
        let tiny = BudgetPolicy {
            payload_limit: 100,
            reserved: 0,
            divisor: 1,
        };

        let before = Formatter::new(FormatterOptions {
            budget: tiny,
            ..Default::default()
        })
        .format(&tests);
        assert!(before.tests[0].output.len() <= 100);

        let after = Formatter::new(FormatterOptions {
            budget: tiny,
            hidden_placement: HiddenPlacement::AfterTruncation,
            ..Default::default()
        })
        .format(&tests);
        assert_eq!(after.tests[0].output.len(), 200);
    }

    #[tokio::test]
    async fn test_export_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results/nested/results.json");
        let tests = vec![custom("a", None, Some(true))];
        let report = Formatter::default().format(&tests);
        report.export(&path).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["gradable"], true);
        assert!(json["tests"][0].get("max_points").is_none());
        assert_eq!(json["tests"][0]["output"], "custom output");
    }
}
