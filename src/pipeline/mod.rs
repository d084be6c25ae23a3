//! Execution pipeline
//!
//! An `Autograder` owns one sandbox pair and an ordered list of test cases.
//! `execute` builds the reference (if configured), populates the submission
//! sandbox and then runs the tests in insertion order until one of the abort
//! rules fires:
//! - the missing-files check failed
//! - the build check failed
//! - a test flagged `early_stop` failed
//!
//! Tests after the abort point are left untouched (`has_run == false`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::error::{GraderError, Result};
use crate::loader::{IoTestBulkLoader, RealtimeTestBulkLoader};
use crate::runner::{CommandSpec, RunError, Runner, ShellRunner};
use crate::sandbox::{SandboxConfig, SandboxPair};
use crate::testcase::{
    BasicTest, CustomReport, CustomTest, ExecContext, Generator, TestCase, TestRole,
};

pub const MISSING_FILES_TEST_NAME: &str = "Missing Files Check";
pub const BUILD_TEST_NAME: &str = "Compiling";

/// Everything needed to set up one autograder
#[derive(Debug, Clone)]
pub struct AutograderOptions {
    pub name: String,
    /// Directory holding the student's files
    pub submission_path: PathBuf,
    /// Directory holding test assets and supplied files
    pub tests_path: PathBuf,
    /// Subdirectory of each sandbox that commands run in
    pub working_directory: String,
    pub required_files: Vec<String>,
    pub supplied_files: Vec<String>,
    pub build_command: Option<String>,
    pub compile_points: f64,
    pub missing_files_check: bool,
    pub interpreter: Option<PathBuf>,
    pub reference_path: Option<PathBuf>,
    pub reference_build_command: Option<String>,
    pub sandbox: SandboxConfig,
}

impl AutograderOptions {
    pub fn new(
        name: impl Into<String>,
        submission_path: impl Into<PathBuf>,
        tests_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            submission_path: submission_path.into(),
            tests_path: tests_path.into(),
            working_directory: String::new(),
            required_files: Vec::new(),
            supplied_files: Vec::new(),
            build_command: None,
            compile_points: 0.0,
            missing_files_check: true,
            interpreter: None,
            reference_path: None,
            reference_build_command: None,
            sandbox: SandboxConfig::default(),
        }
    }
}

pub struct Autograder {
    name: String,
    submission_path: PathBuf,
    tests_path: PathBuf,
    required_files: Vec<String>,
    supplied_files: Vec<String>,
    interpreter: Option<PathBuf>,
    reference_path: Option<PathBuf>,
    reference_build_command: Option<String>,
    sandbox_config: SandboxConfig,
    sandboxes: SandboxPair,
    runner: Arc<dyn Runner>,
    test_cases: Vec<TestCase>,
    span: Span,
}

impl Autograder {
    pub fn new(options: AutograderOptions) -> Result<Self> {
        let span = info_span!("autograder", name = %options.name);
        let sandboxes = span.in_scope(|| {
            SandboxPair::new(&options.sandbox, &options.working_directory)
        })?;

        let mut autograder = Self {
            name: options.name,
            submission_path: options.submission_path,
            tests_path: options.tests_path,
            required_files: options.required_files,
            supplied_files: options.supplied_files,
            interpreter: options.interpreter,
            reference_path: options.reference_path,
            reference_build_command: options.reference_build_command,
            sandbox_config: options.sandbox,
            sandboxes,
            runner: Arc::new(ShellRunner::new()),
            test_cases: Vec::new(),
            span,
        };

        if options.missing_files_check {
            let check = autograder.missing_files_check();
            autograder.add_test(check);
        }
        if let Some(command) = options.build_command {
            let build = autograder.build_check(command, options.compile_points);
            autograder.add_test(build);
        }
        Ok(autograder)
    }

    /// Replace the command runner
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tests_path(&self) -> &Path {
        &self.tests_path
    }

    pub fn interpreter(&self) -> Option<&Path> {
        self.interpreter.as_deref()
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    /// Append a test case, prefixing its name with the autograder's
    pub fn add_test(&mut self, mut test: TestCase) -> &mut Self {
        test.name = format!("{}: {}", self.name, test.name);
        self.test_cases.push(test);
        self
    }

    pub fn io_tests_bulk_loader(&mut self) -> IoTestBulkLoader<'_> {
        IoTestBulkLoader::new(self)
    }

    pub fn realtime_tests_bulk_loader(
        &mut self,
        generator: Arc<dyn Generator>,
    ) -> RealtimeTestBulkLoader<'_> {
        RealtimeTestBulkLoader::new(self, generator)
    }

    fn missing_files_check(&self) -> TestCase {
        let submission_path = self.submission_path.clone();
        let required_files = self.required_files.clone();

        let check = CustomTest::new(move |report: &mut CustomReport| {
            info!("Checking missing files...");
            let missing: Vec<&str> = required_files
                .iter()
                .filter(|f| !submission_path.join(f).exists())
                .map(String::as_str)
                .collect();

            if missing.is_empty() {
                report.output = "All required files have been located.".to_string();
                report.passed = true;
            } else {
                report.output = std::iter::once("Missing files")
                    .chain(missing)
                    .collect::<Vec<_>>()
                    .join("\n");
            }
        });

        TestCase::custom(MISSING_FILES_TEST_NAME, check)
            .with_points(Some(0.0))
            .with_role(TestRole::MissingFiles)
    }

    fn build_check(&self, command: String, points: f64) -> TestCase {
        let build = BasicTest::new(command)
            .with_expected_retcode(Some(0))
            .with_interpreter(self.interpreter.clone());

        TestCase::basic(BUILD_TEST_NAME, build)
            .with_points(Some(points))
            .with_timeout(self.sandbox_config.build_timeout)
            .with_role(TestRole::Build)
    }

    /// Run the whole pipeline; only pipeline-fatal conditions are errors
    pub async fn execute(&mut self) -> Result<()> {
        let span = self.span.clone();
        self.execute_inner().instrument(span).await
    }

    async fn execute_inner(&mut self) -> Result<()> {
        if let Err(e) = self.build_reference().await {
            error!("{}", e);
            return Err(e);
        }
        self.populate_submission()?;

        let ctx = ExecContext {
            runner: self.runner.as_ref(),
            sandboxes: &self.sandboxes,
        };

        for test in self.test_cases.iter_mut() {
            let test_span = info_span!(parent: &self.span, "test", name = %test.name);
            if let Err(e) = test.execute(&ctx).instrument(test_span).await {
                error!("Pipeline-fatal error in {}: {}", test.name, e);
                return Err(e);
            }

            if test.result.passed || !test.aborts_on_failure() {
                continue;
            }
            match test.role {
                TestRole::MissingFiles => info!("Some files are missing. Aborting autograder."),
                TestRole::Build => info!("Failed to compile. Aborting autograder."),
                TestRole::Regular => info!("Early stop. Aborting autograder."),
            }
            break;
        }

        Ok(())
    }

    async fn build_reference(&self) -> Result<()> {
        let (Some(reference_path), Some(command)) =
            (&self.reference_path, &self.reference_build_command)
        else {
            return Ok(());
        };

        let reference = &self.sandboxes.reference;
        info!("Building {} reference in {:?}...", self.name, reference.path());

        let entries = std::fs::read_dir(reference_path).map_err(|source| GraderError::Sandbox {
            path: reference_path.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry?;
            reference.copy_in(reference_path, &entry.file_name().to_string_lossy())?;
        }

        let spec = CommandSpec::new(command)
            .with_interpreter(self.interpreter.clone())
            .with_work_dir(reference.work_dir())
            .with_timeout(self.sandbox_config.reference_build_timeout);

        match self.runner.run(&spec).await {
            Ok(outcome) if outcome.is_success() => {
                info!("{} reference built", self.name);
                Ok(())
            }
            Ok(outcome) => Err(GraderError::ReferenceBuildFailed {
                autograder: self.name.clone(),
                exit_code: outcome.exit_code,
            }),
            Err(RunError::Timeout { limit, .. }) => Err(GraderError::ReferenceBuildTimedOut {
                autograder: self.name.clone(),
                limit,
            }),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("{} reference build could not run", self.name))
                .into()),
        }
    }

    /// Copy required files, then supplied files, into the submission sandbox
    fn populate_submission(&self) -> Result<()> {
        let submission = &self.sandboxes.submission;
        for item in &self.required_files {
            if !submission.copy_in(&self.submission_path, item)? {
                warn!("Required file {} not found in submission", item);
            }
        }
        for item in &self.supplied_files {
            if !submission.copy_in(&self.tests_path, item)? {
                warn!("Supplied file {} not found in {:?}", item, self.tests_path);
            }
        }
        Ok(())
    }

    /// Remove both sandboxes now instead of on drop
    pub fn cleanup(self) -> Result<()> {
        self.sandboxes.cleanup()
    }
}

impl std::fmt::Debug for Autograder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autograder")
            .field("name", &self.name)
            .field("sandboxes", &self.sandboxes)
            .field("test_cases", &self.test_cases.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TestState;
    use crate::loader::TestOptions;
    use crate::testcase::{FnGenerator, IoTest, Source};
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn options(submission: &TempDir, tests: &TempDir) -> AutograderOptions {
        AutograderOptions::new("PA1", submission.path(), tests.path())
    }

    fn io_case(name: &str, command: &str, expected: &str) -> TestCase {
        let test = IoTest::new(Source::literal(command))
            .with_expected_stdout(Source::literal(expected));
        TestCase::io(name, test).with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_missing_required_file_aborts() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        let mut opts = options(&submission, &tests);
        opts.required_files = vec!["a.c".into()];
        opts.build_command = Some("true".into());

        let mut ag = Autograder::new(opts).unwrap();
        ag.add_test(io_case("t1", "echo hi", "hi\n"));
        ag.execute().await.unwrap();

        let cases = ag.test_cases();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].name, "PA1: Missing Files Check");
        assert_eq!(cases[0].result.state, TestState::Failed);
        assert_eq!(cases[0].result.message.as_deref(), Some("Missing files\na.c"));
        assert!(!cases[1].result.has_run);
        assert!(!cases[2].result.has_run);
    }

    #[tokio::test]
    async fn test_required_and_supplied_files_are_copied() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        std::fs::write(submission.path().join("a.txt"), "from student\n").unwrap();
        std::fs::create_dir(tests.path().join("data")).unwrap();
        std::fs::write(tests.path().join("data/b.txt"), "from staff\n").unwrap();

        let mut opts = options(&submission, &tests);
        opts.required_files = vec!["a.txt".into()];
        opts.supplied_files = vec!["data".into()];

        let mut ag = Autograder::new(opts).unwrap();
        ag.add_test(io_case(
            "cat",
            "cat a.txt data/b.txt",
            "from student\nfrom staff\n",
        ));
        ag.execute().await.unwrap();

        let cases = ag.test_cases();
        assert_eq!(cases[0].result.state, TestState::Passed);
        assert_eq!(cases[1].result.state, TestState::Passed);
    }

    #[tokio::test]
    async fn test_failed_build_aborts() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        let mut opts = options(&submission, &tests);
        opts.build_command = Some("exit 2".into());
        opts.compile_points = 5.0;

        let mut ag = Autograder::new(opts).unwrap();
        ag.add_test(io_case("t1", "echo hi", "hi\n"));
        ag.execute().await.unwrap();

        let cases = ag.test_cases();
        assert_eq!(cases[1].name, "PA1: Compiling");
        assert_eq!(cases[1].point_value, Some(5.0));
        assert_eq!(cases[1].result.state, TestState::Failed);
        assert!(!cases[2].result.has_run);
    }

    #[tokio::test]
    async fn test_build_timeout_aborts() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        let mut opts = options(&submission, &tests);
        opts.missing_files_check = false;
        opts.build_command = Some("sleep 5".into());
        opts.sandbox = SandboxConfig::default().with_build_timeout(Duration::from_millis(300));

        let mut ag = Autograder::new(opts).unwrap();
        ag.add_test(io_case("t1", "echo hi", "hi\n"))
            .add_test(io_case("t2", "echo hi", "hi\n"));
        ag.execute().await.unwrap();

        let cases = ag.test_cases();
        assert_eq!(cases[0].name, "PA1: Compiling");
        assert_eq!(cases[0].result.state, TestState::TimedOut);
        assert!(cases[1..].iter().all(|t| !t.result.has_run));
    }

    #[tokio::test]
    async fn test_reference_build_timeout_is_fatal() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        let reference = TempDir::new().unwrap();
        let mut opts = options(&submission, &tests);
        opts.reference_path = Some(reference.path().to_path_buf());
        opts.reference_build_command = Some("sleep 5".into());
        opts.sandbox =
            SandboxConfig::default().with_reference_build_timeout(Duration::from_millis(300));

        let mut ag = Autograder::new(opts).unwrap();
        let err = ag.execute().await.unwrap_err();

        assert!(matches!(err, GraderError::ReferenceBuildTimedOut { .. }));
        assert!(ag.test_cases().iter().all(|t| !t.result.has_run));
    }

    #[tokio::test]
    async fn test_early_stop_only_after_failure() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        let mut opts = options(&submission, &tests);
        opts.missing_files_check = false;

        let mut ag = Autograder::new(opts).unwrap();
        ag.add_test(io_case("passes", "echo ok", "ok\n").with_early_stop(true))
            .add_test(io_case("fails", "echo bad", "ok\n"))
            .add_test(io_case("gate", "echo bad", "ok\n").with_early_stop(true))
            .add_test(io_case("skipped", "echo ok", "ok\n"));
        ag.execute().await.unwrap();

        let states: Vec<_> = ag.test_cases().iter().map(|t| t.result.state).collect();
        assert_eq!(
            states,
            vec![
                TestState::Passed,
                TestState::Failed,
                TestState::Failed,
                TestState::Pending
            ]
        );
    }

    #[tokio::test]
    async fn test_reference_build_failure_is_fatal() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        let reference = TempDir::new().unwrap();
        let mut opts = options(&submission, &tests);
        opts.reference_path = Some(reference.path().to_path_buf());
        opts.reference_build_command = Some("exit 1".into());

        let mut ag = Autograder::new(opts).unwrap();
        let err = ag.execute().await.unwrap_err();

        assert!(matches!(
            err,
            GraderError::ReferenceBuildFailed { exit_code: 1, .. }
        ));
        assert!(ag.test_cases().iter().all(|t| !t.result.has_run));
    }

    #[tokio::test]
    async fn test_reference_is_built_before_realtime_tests() {
        let submission = TempDir::new().unwrap();
        let tests = TempDir::new().unwrap();
        let reference = TempDir::new().unwrap();
        let square = "#!/bin/sh\nread x; echo $((x * x))\n";
        std::fs::write(reference.path().join("square.sh"), square).unwrap();
        let prog = submission.path().join("square");
        std::fs::write(&prog, square).unwrap();
        std::fs::set_permissions(&prog, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut opts = options(&submission, &tests);
        opts.required_files = vec!["square".into()];
        opts.reference_path = Some(reference.path().to_path_buf());
        opts.reference_build_command = Some("cp square.sh square && chmod +x square".into());

        let generator = Arc::new(FnGenerator::new("square", |ctx| {
            ctx.stdin = Some(format!("{}\n", ctx.id + 1));
            ctx.argv = Some(vec!["square".into()]);
            Ok(())
        }));

        let mut ag = Autograder::new(opts).unwrap();
        ag.realtime_tests_bulk_loader(generator)
            .default_timeout(Duration::from_secs(5))
            .add_list(&[("small", 1.0), ("large", 2.0)], TestOptions::default());
        ag.execute().await.unwrap();

        let cases = ag.test_cases();
        assert_eq!(cases.len(), 3);
        assert!(cases.iter().all(|t| t.result.state == TestState::Passed));
        assert_eq!(cases[2].result.score, 2.0);
    }
}
