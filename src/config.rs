//! Grading configuration loaded from TOML
//!
//! ```toml
//! [report]
//! hide_points = false
//! divisor = 3
//!
//! [[autograder]]
//! name = "PA1"
//! submission_path = "/autograder/submission"
//! tests_path = "/autograder/source/tests"
//! required_files = ["calc.c"]
//! build_command = "make"
//! compile_points = 1
//!
//! [[autograder.io_tests]]
//! tests = [{ name = "1", points = 2 }, { name = "2", points = 3 }]
//!
//! [[autograder.realtime_tests]]
//! generator = "gen.py"
//! generator_interpreter = "/usr/bin/python3"
//! tests = [{ name = "random", points = 5 }]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{GraderError, Result};
use crate::loader::{IoLayout, TestOptions};
use crate::pipeline::{Autograder, AutograderOptions};
use crate::report::{BudgetPolicy, FormatterOptions, HiddenPlacement};
use crate::sandbox::SandboxConfig;
use crate::testcase::{ProcessGenerator, ReferencePolicy, DEFAULT_HIDDEN_MSG};

#[derive(Debug, Clone, Deserialize)]
struct RawTestEntry {
    name: String,
    #[serde(default = "default_points")]
    points: f64,
}

fn default_points() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_hidden_msg() -> String {
    DEFAULT_HIDDEN_MSG.to_string()
}

/// Settings shared by every test of a batch
#[derive(Debug, Clone, Deserialize)]
struct RawBatch {
    #[serde(default)]
    prefix: String,
    timeout_secs: Option<f64>,
    #[serde(default)]
    binary_io: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default = "default_hidden_msg")]
    hidden_msg: String,
    #[serde(default)]
    early_stop: bool,
    #[serde(default)]
    tests: Vec<RawTestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawIoBatch {
    #[serde(flatten)]
    batch: RawBatch,
    /// Overrides `{tests_path}/in`
    in_dir: Option<PathBuf>,
    /// Overrides `{tests_path}/exp`
    exp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRealtimeBatch {
    #[serde(flatten)]
    batch: RawBatch,
    generator: PathBuf,
    generator_interpreter: Option<PathBuf>,
    #[serde(default)]
    reference_policy: RawReferencePolicy,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawReferencePolicy {
    #[default]
    Errored,
    Fatal,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAutograder {
    name: String,
    submission_path: PathBuf,
    tests_path: PathBuf,
    #[serde(default)]
    working_directory: String,
    #[serde(default)]
    required_files: Vec<String>,
    #[serde(default)]
    supplied_files: Vec<String>,
    build_command: Option<String>,
    #[serde(default)]
    compile_points: f64,
    #[serde(default = "default_true")]
    missing_files_check: bool,
    interpreter: Option<PathBuf>,
    reference_path: Option<PathBuf>,
    reference_build_command: Option<String>,
    #[serde(default)]
    io_tests: Vec<RawIoBatch>,
    #[serde(default)]
    realtime_tests: Vec<RawRealtimeBatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawReport {
    message: Option<String>,
    visibility: Option<String>,
    stdout_visibility: Option<String>,
    hidden_tests_visibility: Option<String>,
    hide_points: Option<bool>,
    verbose: Option<bool>,
    html_diff: Option<bool>,
    hidden_placement: Option<HiddenPlacement>,
    payload_limit: Option<usize>,
    reserved: Option<usize>,
    divisor: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    autograder: Vec<RawAutograder>,
    #[serde(default)]
    report: RawReport,
}

/// One batch of tests added through a bulk loader
#[derive(Debug, Clone)]
pub struct Batch {
    pub prefix: String,
    pub timeout: Option<Duration>,
    pub binary_io: bool,
    pub options: TestOptions,
    pub tests: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct IoBatch {
    pub batch: Batch,
    pub in_dir: Option<PathBuf>,
    pub exp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RealtimeBatch {
    pub batch: Batch,
    pub generator: ProcessGenerator,
    pub reference_policy: ReferencePolicy,
}

#[derive(Debug, Clone)]
pub struct AutograderConfig {
    pub options: AutograderOptions,
    pub io_tests: Vec<IoBatch>,
    pub realtime_tests: Vec<RealtimeBatch>,
}

#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub autograders: Vec<AutograderConfig>,
    pub report: FormatterOptions,
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| GraderError::Config(format!("invalid {}: {}", what, value)))
}

impl RawBatch {
    fn into_batch(self) -> Result<Batch> {
        let timeout = self
            .timeout_secs
            .map(|secs| seconds(secs, "timeout_secs"))
            .transpose()?;
        let mut options = TestOptions::default().early_stop(self.early_stop);
        if self.hidden {
            options = options.hidden(self.hidden_msg);
        }
        Ok(Batch {
            prefix: self.prefix,
            timeout,
            binary_io: self.binary_io,
            options,
            tests: self.tests.into_iter().map(|t| (t.name, t.points)).collect(),
        })
    }
}

impl RawAutograder {
    fn into_config(self, sandbox: &SandboxConfig) -> Result<AutograderConfig> {
        if self.name.trim().is_empty() {
            return Err(GraderError::Config("autograder name must not be empty".into()));
        }

        let io_tests = self
            .io_tests
            .into_iter()
            .map(|raw| {
                Ok(IoBatch {
                    batch: raw.batch.into_batch()?,
                    in_dir: raw.in_dir,
                    exp_dir: raw.exp_dir,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let tests_path = self.tests_path.clone();
        let realtime_tests = self
            .realtime_tests
            .into_iter()
            .map(|raw| {
                let path = if raw.generator.is_absolute() {
                    raw.generator
                } else {
                    tests_path.join(raw.generator)
                };
                Ok(RealtimeBatch {
                    batch: raw.batch.into_batch()?,
                    generator: ProcessGenerator::new(path)
                        .with_interpreter(raw.generator_interpreter),
                    reference_policy: match raw.reference_policy {
                        RawReferencePolicy::Errored => ReferencePolicy::Errored,
                        RawReferencePolicy::Fatal => ReferencePolicy::Fatal,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut options = AutograderOptions::new(self.name, self.submission_path, self.tests_path);
        options.working_directory = self.working_directory;
        options.required_files = self.required_files;
        options.supplied_files = self.supplied_files;
        options.build_command = self.build_command;
        options.compile_points = self.compile_points;
        options.missing_files_check = self.missing_files_check;
        options.interpreter = self.interpreter;
        options.reference_path = self.reference_path;
        options.reference_build_command = self.reference_build_command;
        options.sandbox = sandbox.clone();

        Ok(AutograderConfig {
            options,
            io_tests,
            realtime_tests,
        })
    }
}

impl From<RawReport> for FormatterOptions {
    fn from(raw: RawReport) -> Self {
        let defaults = FormatterOptions::default();
        let budget = BudgetPolicy::default();
        Self {
            message: raw.message,
            visibility: raw.visibility.or(defaults.visibility),
            stdout_visibility: raw.stdout_visibility.or(defaults.stdout_visibility),
            hidden_tests_visibility: raw
                .hidden_tests_visibility
                .or(defaults.hidden_tests_visibility),
            hide_points: raw.hide_points.unwrap_or(defaults.hide_points),
            verbose: raw.verbose.unwrap_or(defaults.verbose),
            html_diff: raw.html_diff.unwrap_or(defaults.html_diff),
            hidden_placement: raw.hidden_placement.unwrap_or(defaults.hidden_placement),
            budget: BudgetPolicy {
                payload_limit: raw.payload_limit.unwrap_or(budget.payload_limit),
                reserved: raw.reserved.unwrap_or(budget.reserved),
                divisor: raw.divisor.unwrap_or(budget.divisor),
            },
        }
    }
}

/// Parse a grading configuration from TOML text
pub fn parse_config(content: &str) -> Result<GraderConfig> {
    let raw: RawConfig =
        toml::from_str(content).map_err(|e| GraderError::Config(e.to_string()))?;
    if raw.autograder.is_empty() {
        return Err(GraderError::Config("no [[autograder]] defined".into()));
    }

    let sandbox = SandboxConfig::default();
    let autograders = raw
        .autograder
        .into_iter()
        .map(|ag| ag.into_config(&sandbox))
        .collect::<Result<Vec<_>>>()?;

    Ok(GraderConfig {
        autograders,
        report: raw.report.into(),
    })
}

/// Load the grading configuration from a TOML file
pub fn load_config(path: &Path) -> Result<GraderConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GraderError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let config = parse_config(&content)?;
    info!(
        "Loaded {} autograder(s) from {}",
        config.autograders.len(),
        path.display()
    );
    Ok(config)
}

impl AutograderConfig {
    /// Create the autograder and add every configured batch, in order
    pub fn build(&self, submission_override: Option<&Path>) -> Result<Autograder> {
        let mut options = self.options.clone();
        if let Some(path) = submission_override {
            options.submission_path = path.to_path_buf();
        }
        let mut autograder = Autograder::new(options)?;

        for io in &self.io_tests {
            let mut layout = IoLayout::under(autograder.tests_path());
            if let Some(dir) = &io.in_dir {
                layout.commands = layout.commands.in_dir(dir);
                layout.input = layout.input.in_dir(dir);
            }
            if let Some(dir) = &io.exp_dir {
                layout.expected_stdout = layout.expected_stdout.in_dir(dir);
                layout.expected_stderr = layout.expected_stderr.in_dir(dir);
                layout.expected_exit_status = layout.expected_exit_status.in_dir(dir);
            }

            let mut loader = autograder
                .io_tests_bulk_loader()
                .layout(layout)
                .prefix(io.batch.prefix.clone())
                .binary_io(io.batch.binary_io);
            if let Some(timeout) = io.batch.timeout {
                loader = loader.default_timeout(timeout);
            }
            loader.add_list(&io.batch.name_points(), io.batch.options.clone());
        }

        for rt in &self.realtime_tests {
            let mut loader = autograder
                .realtime_tests_bulk_loader(Arc::new(rt.generator.clone()))
                .prefix(rt.batch.prefix.clone())
                .binary_io(rt.batch.binary_io)
                .reference_policy(rt.reference_policy);
            if let Some(timeout) = rt.batch.timeout {
                loader = loader.default_timeout(timeout);
            }
            loader.add_list(&rt.batch.name_points(), rt.batch.options.clone());
        }

        Ok(autograder)
    }
}

impl Batch {
    fn name_points(&self) -> Vec<(&str, f64)> {
        self.tests
            .iter()
            .map(|(name, points)| (name.as_str(), *points))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::{Source, TestKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[report]
hide_points = true
divisor = 2
hidden_placement = "after_truncation"

[[autograder]]
name = "PA1"
submission_path = "/tmp/submission"
tests_path = "/tmp/tests"
required_files = ["calc.c"]
build_command = "make"
compile_points = 1

[[autograder.io_tests]]
prefix = "calc-"
timeout_secs = 2.5
exp_dir = "/tmp/expected"
tests = [{ name = "1", points = 2 }, { name = "2" }]

[[autograder.realtime_tests]]
generator = "gen.py"
generator_interpreter = "/usr/bin/python3"
reference_policy = "fatal"
hidden = true
tests = [{ name = "random", points = 5 }]
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert!(config.report.hide_points);
        assert_eq!(config.report.budget.divisor, 2);
        assert_eq!(config.report.hidden_placement, HiddenPlacement::AfterTruncation);
        assert_eq!(config.report.stdout_visibility.as_deref(), Some("hidden"));

        let ag = &config.autograders[0];
        assert_eq!(ag.options.build_command.as_deref(), Some("make"));
        assert!(ag.options.missing_files_check);
        assert_eq!(ag.io_tests[0].batch.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(
            ag.io_tests[0].batch.tests,
            vec![("1".to_string(), 2.0), ("2".to_string(), 1.0)]
        );

        let rt = &ag.realtime_tests[0];
        assert_eq!(rt.generator.path, PathBuf::from("/tmp/tests/gen.py"));
        assert_eq!(rt.reference_policy, ReferencePolicy::Fatal);
        assert!(rt.batch.options.hidden);
    }

    #[test]
    fn test_build_adds_batches_in_order() {
        let config = parse_config(SAMPLE).unwrap();
        let ag = config.autograders[0]
            .build(Some(Path::new("/tmp/other")))
            .unwrap();

        let names: Vec<_> = ag.test_cases().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "PA1: Missing Files Check",
                "PA1: Compiling",
                "PA1: calc-1",
                "PA1: calc-2",
                "PA1: random",
            ]
        );
        let TestKind::Io(io) = &ag.test_cases()[2].kind else {
            panic!("expected io test");
        };
        assert_eq!(
            io.expected_stdout,
            Some(Source::OptionalFile(PathBuf::from("/tmp/expected/out-calc-1")))
        );
        assert_eq!(io.command, Source::File(PathBuf::from("/tmp/tests/in/cmd-calc-1")));
        assert!(ag.test_cases()[4].hidden);
    }

    #[test]
    fn test_rejects_empty_config() {
        assert!(matches!(parse_config(""), Err(GraderError::Config(_))));
        assert!(matches!(
            parse_config("[[autograder]]\nname = 1"),
            Err(GraderError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", SAMPLE).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.autograders.len(), 1);
        assert!(load_config(Path::new("/nonexistent/grader.toml")).is_err());
    }
}
