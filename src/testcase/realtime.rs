//! Realtime test: the input is generated per run and, unless the generator
//! supplies every expectation literally, the expected streams come from the
//! reference program run in the reference sandbox.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::compare::Comparison;
use super::generator::{Generator, GeneratorContext};
use super::{ExecContext, TestMeta};
use crate::core::utils::enclosed_path;
use crate::core::TestResult;
use crate::error::{GraderError, Result};
use crate::runner::{CommandSpec, CompareMode, RunError};
use crate::sandbox::ScratchGuard;

/// What a reference-run timeout means for the grading run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferencePolicy {
    /// Only this test is marked errored
    #[default]
    Errored,
    /// The whole pipeline stops
    Fatal,
}

#[derive(Clone)]
pub struct RealtimeTest {
    pub generator: Arc<dyn Generator>,
    /// Handed to the generator so it can vary its output per test
    pub id: i64,
    pub interpreter: Option<PathBuf>,
    pub mode: CompareMode,
    pub reference_policy: ReferencePolicy,
    /// Context produced by the generator
    pub context: Option<GeneratorContext>,
    pub comparison: Option<Comparison>,
}

impl std::fmt::Debug for RealtimeTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeTest")
            .field("generator", &self.generator.describe())
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("reference_policy", &self.reference_policy)
            .finish_non_exhaustive()
    }
}

/// Scratch file names of one execution
struct ScratchNames {
    stdin: String,
    stdout: String,
    stderr: String,
}

impl ScratchNames {
    fn new() -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        Self {
            stdin: format!(".realtime-{}.in", tag),
            stdout: format!(".realtime-{}.out", tag),
            stderr: format!(".realtime-{}.err", tag),
        }
    }
}

/// Single-quote a word for `sh`
fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r#"'"'"'"#))
}

fn command_line(work_dir: &Path, argv: &[String], stdin: &str) -> String {
    let mut parts = Vec::with_capacity(argv.len() + 2);
    if let Some((program, args)) = argv.split_first() {
        parts.push(quote(&work_dir.join(program).to_string_lossy()));
        parts.extend(args.iter().map(|arg| quote(arg)));
    }
    parts.push("<".to_string());
    parts.push(quote(stdin));
    parts.join(" ")
}

impl RealtimeTest {
    pub fn new(generator: Arc<dyn Generator>, id: i64) -> Self {
        Self {
            generator,
            id,
            interpreter: None,
            mode: CompareMode::Text,
            reference_policy: ReferencePolicy::default(),
            context: None,
            comparison: None,
        }
    }

    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_mode(mut self, mode: CompareMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference_policy = policy;
        self
    }

    pub(crate) async fn execute(
        &mut self,
        meta: &TestMeta,
        result: &mut TestResult,
        ctx: &ExecContext<'_>,
    ) -> Result<()> {
        // Phase 1: generate
        let mut generated =
            GeneratorContext::new(self.id, &meta.name, meta.point_value, meta.timeout);
        if let Err(e) = self.generator.generate(&mut generated).await {
            warn!("Generator {} failed: {:#}", self.generator.describe(), e);
            result.errored(format!("{:#}", e));
            return Ok(());
        }
        let (Some(stdin), Some(argv)) = (generated.stdin.clone(), generated.argv.clone()) else {
            result.errored("Generator did not provide both stdin and argv.");
            self.context = Some(generated);
            return Ok(());
        };
        if argv.is_empty() {
            result.errored("Generator returned an empty argv.");
            self.context = Some(generated);
            return Ok(());
        }

        // Phase 2: materialize, reference run, submission run
        let mut guard = ScratchGuard::new();
        let outcome = self
            .run_phases(meta, result, ctx, &generated, &stdin, &argv, &mut guard)
            .await;
        guard.release();
        self.context = Some(generated);
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_phases(
        &mut self,
        meta: &TestMeta,
        result: &mut TestResult,
        ctx: &ExecContext<'_>,
        generated: &GeneratorContext,
        stdin: &str,
        argv: &[String],
        guard: &mut ScratchGuard,
    ) -> Result<()> {
        let names = ScratchNames::new();
        let submission_dir = ctx.sandboxes.submission.work_dir();
        let reference_dir = ctx.sandboxes.reference.work_dir();

        for dir in [&submission_dir, &reference_dir] {
            if let Err(e) = guard.write(dir, Path::new(&names.stdin), stdin.as_bytes()).await {
                result.errored(format!("Failed to write generated stdin: {}", e));
                return Ok(());
            }
            for file in &generated.files {
                let written = match (enclosed_path(&file.path), file.bytes()) {
                    (Some(relative), Ok(bytes)) => guard
                        .write(dir, &relative, &bytes)
                        .await
                        .map_err(anyhow::Error::from),
                    (None, _) => Err(anyhow::anyhow!(
                        "Generated file escapes the sandbox: {}",
                        file.path
                    )),
                    (_, Err(e)) => Err(e),
                };
                if let Err(e) = written {
                    result.errored(format!("{:#}", e));
                    return Ok(());
                }
            }
        }

        let mut cmp = Comparison::new(command_line(&submission_dir, argv, &names.stdin));
        cmp.input = Some(stdin.as_bytes().to_vec());

        if generated.has_literal_expectations() {
            debug!("{}: literal expectations, skipping reference run", meta.name);
        } else {
            let stdout_path = guard.track(reference_dir.join(&names.stdout));
            let stderr_path = guard.track(reference_dir.join(&names.stderr));
            let reference_cmd = format!(
                "{} > {} 2> {}",
                command_line(&reference_dir, argv, &names.stdin),
                quote(&names.stdout),
                quote(&names.stderr)
            );
            let spec = CommandSpec::new(reference_cmd)
                .with_interpreter(self.interpreter.clone())
                .with_work_dir(&reference_dir)
                .with_timeout(meta.timeout)
                .with_capture_output(false);

            match ctx.runner.run(&spec).await {
                Ok(reference) => {
                    let read = async {
                        let out = tokio::fs::read(&stdout_path).await?;
                        let err = tokio::fs::read(&stderr_path).await?;
                        Ok::<_, std::io::Error>((out, err))
                    };
                    match read.await {
                        Ok((out, err)) => {
                            cmp.expected_stdout = Some(out);
                            cmp.expected_stderr = Some(err);
                            cmp.expected_exit_status = Some(reference.exit_code);
                        }
                        Err(e) => {
                            result.errored(format!("Failed to read reference output: {}", e));
                            self.comparison = Some(cmp);
                            return Ok(());
                        }
                    }
                }
                Err(RunError::Timeout { limit, .. }) => {
                    warn!("{}: reference run timed out (limit={:?})", meta.name, limit);
                    result.errored(format!("Reference solution timed out with limit = {:?}.", limit));
                    self.comparison = Some(cmp);
                    return match self.reference_policy {
                        ReferencePolicy::Errored => Ok(()),
                        ReferencePolicy::Fatal => Err(GraderError::ReferenceRunTimedOut {
                            test: meta.name.clone(),
                            limit,
                        }),
                    };
                }
                Err(e) => {
                    result.errored(format!("{}", e));
                    self.comparison = Some(cmp);
                    return Ok(());
                }
            }
        }

        // Literal fields win over the reference run
        if let Some(stdout) = &generated.stdout {
            cmp.expected_stdout = Some(stdout.as_bytes().to_vec());
        }
        if let Some(stderr) = &generated.stderr {
            cmp.expected_stderr = Some(stderr.as_bytes().to_vec());
        }
        if let Some(code) = generated.exitcode {
            cmp.expected_exit_status = Some(code);
        }

        let spec = CommandSpec::new(cmp.command.clone())
            .with_interpreter(self.interpreter.clone())
            .with_work_dir(&submission_dir)
            .with_timeout(meta.timeout);
        match ctx.runner.run(&spec).await {
            Ok(outcome) => {
                let running_time = Some(outcome.running_time);
                let checks = cmp.evaluate(outcome, self.mode);
                if checks.all_passed() {
                    result.pass(meta.points(), running_time);
                } else {
                    result.fail(cmp.mismatch_summary(), running_time);
                }
            }
            Err(RunError::Timeout { limit, .. }) => {
                info!("{} timed out (limit={:?})", meta.name, limit);
                result.time_out(limit);
            }
            Err(e) => result.errored(format!("{}", e)),
        }

        self.comparison = Some(cmp);
        Ok(())
    }
}
