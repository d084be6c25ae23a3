//! Realtime test generators
//!
//! A generator fills a `GeneratorContext` with the stdin and argv of one test
//! run, and optionally with literal expectations and extra files. Two plugins
//! ship with the crate: `FnGenerator` wraps an in-process closure, and
//! `ProcessGenerator` runs an executable that reads the context as JSON on
//! stdin and writes the mutated context as JSON on stdout.

use anyhow::{bail, Context};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Extra file written next to the generated stdin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Path relative to the sandbox working directory
    pub path: String,
    /// Text content, or base64 when `is_binary`
    pub content: String,
    #[serde(default)]
    pub is_binary: bool,
}

impl GeneratedFile {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            is_binary: false,
        }
    }

    pub fn binary(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            content: general_purpose::STANDARD.encode(bytes),
            is_binary: true,
        }
    }

    pub fn bytes(&self) -> anyhow::Result<Vec<u8>> {
        if !self.is_binary {
            return Ok(self.content.clone().into_bytes());
        }
        general_purpose::STANDARD
            .decode(&self.content)
            .with_context(|| format!("Failed to decode base64 content for {}", self.path))
    }
}

/// Data exchanged with a generator for one test run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorContext {
    pub id: i64,
    pub name: String,
    pub point_value: Option<f64>,
    pub timeout_secs: f64,
    pub stdin: Option<String>,
    /// Program followed by its arguments
    pub argv: Option<Vec<String>>,
    /// Literal expectations; a missing one is produced by the reference run
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exitcode: Option<i32>,
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
}

impl GeneratorContext {
    pub fn new(id: i64, name: impl Into<String>, point_value: Option<f64>, timeout: Duration) -> Self {
        Self {
            id,
            name: name.into(),
            point_value,
            timeout_secs: timeout.as_secs_f64(),
            ..Default::default()
        }
    }

    /// All three expectations are literal, no reference run needed
    pub fn has_literal_expectations(&self) -> bool {
        self.stdout.is_some() && self.stderr.is_some() && self.exitcode.is_some()
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, ctx: &mut GeneratorContext) -> anyhow::Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

pub type GenerateFn = dyn Fn(&mut GeneratorContext) -> anyhow::Result<()> + Send + Sync;

/// In-process generator backed by a closure
pub struct FnGenerator {
    name: String,
    func: Box<GenerateFn>,
}

impl FnGenerator {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut GeneratorContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Generator for FnGenerator {
    async fn generate(&self, ctx: &mut GeneratorContext) -> anyhow::Result<()> {
        (self.func)(ctx)
    }

    fn describe(&self) -> String {
        format!("fn:{}", self.name)
    }
}

/// Generator executable speaking JSON over stdin/stdout
#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    pub path: PathBuf,
    pub interpreter: Option<PathBuf>,
    pub timeout: Duration,
}

impl ProcessGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interpreter: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.path);
                cmd
            }
            None => Command::new(&self.path),
        }
    }
}

#[async_trait]
impl Generator for ProcessGenerator {
    async fn generate(&self, ctx: &mut GeneratorContext) -> anyhow::Result<()> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            bail!("Failed to load generator {}", self.path.display());
        }

        let request = serde_json::to_vec(ctx)?;
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn generator {}", self.path.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&request)
                .await
                .context("Failed to send context to generator")?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("Generator timed out after {:?}", self.timeout))?
            .context("Failed to wait for generator")?;

        if !output.status.success() {
            bail!(
                "Generator {} exited with {}: {}",
                self.path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let updated: GeneratorContext = serde_json::from_slice(&output.stdout)
            .context("Generator printed an invalid context")?;
        debug!("Generator {} produced context for {}", self.path.display(), updated.name);
        *ctx = updated;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
