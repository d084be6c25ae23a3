//! Shell runner implementation
//!
//! Executes grading commands directly through a shell, in their own process
//! group so that a timeout can take down every descendant.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{CommandSpec, RunError, RunOutcome, Runner};

/// Runner that executes commands with `<shell> -c <command>`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
}

impl ShellRunner {
    const DEFAULT_SHELL: &'static str = "/bin/sh";

    pub fn new() -> Self {
        Self {
            shell: Self::DEFAULT_SHELL.into(),
        }
    }

    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Run a command, killing its whole process group on timeout
    pub async fn execute(&self, spec: &CommandSpec) -> Result<RunOutcome, RunError> {
        let shell = spec.interpreter.as_deref().unwrap_or(&self.shell);
        debug!(
            "Running {:?} -c {:?} in {:?} (timeout={:?})",
            shell, spec.command, spec.work_dir, spec.timeout
        );

        let (stdout_cfg, stderr_cfg) = if spec.capture_output {
            (Stdio::piped(), Stdio::piped())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let mut cmd = Command::new(shell);
        cmd.arg("-c")
            .arg(&spec.command)
            .stdin(Stdio::piped())
            .stdout(stdout_cfg)
            .stderr(stderr_cfg)
            .process_group(0)
            .kill_on_drop(true);
        if let Some(dir) = &spec.work_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            command: spec.command.clone(),
            source,
        })?;
        let pid = child.id();

        // Feed stdin from a task so a child that never reads cannot block us
        let mut stdin_task = child.stdin.take().map(|mut pipe| {
            let input = spec.stdin.clone().unwrap_or_default();
            tokio::spawn(async move {
                if !input.is_empty() {
                    // A child exiting before reading everything closes the pipe; that's fine
                    let _ = pipe.write_all(&input).await;
                }
                drop(pipe);
            })
        });
        let mut stdout_task = child.stdout.take().map(spawn_reader);
        let mut stderr_task = child.stderr.take().map(spawn_reader);

        // One deadline covers the exit and the end of both output streams
        let command = &spec.command;
        let finished = tokio::time::timeout(spec.timeout, async {
            let status = child.wait().await.map_err(|source| RunError::Io {
                command: command.clone(),
                source,
            })?;
            let running_time = started.elapsed();

            // Background descendants would otherwise keep the pipes open
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            if let Some(task) = stdin_task.as_mut() {
                let _ = task.await;
            }
            let stdout = collect(&mut stdout_task, command).await?;
            let stderr = collect(&mut stderr_task, command).await?;

            Ok::<_, RunError>(RunOutcome {
                exit_code: exit_code_of(status),
                stdout,
                stderr,
                running_time,
            })
        })
        .await;

        match finished {
            Ok(result) => result,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    debug!("Child already gone after timeout: {}", e);
                }
                if let Some(task) = stdin_task {
                    task.abort();
                }
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                Err(RunError::Timeout {
                    command: spec.command.clone(),
                    limit: spec.timeout,
                })
            }
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<RunOutcome, RunError> {
        self.execute(spec).await
    }
}

type ReadTask = JoinHandle<std::io::Result<Vec<u8>>>;

fn spawn_reader<R>(mut reader: R) -> ReadTask
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

async fn collect(task: &mut Option<ReadTask>, command: &str) -> Result<Vec<u8>, RunError> {
    let Some(task) = task.as_mut() else {
        return Ok(Vec::new());
    };
    match task.await {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(source)) => Err(RunError::Io {
            command: command.to_string(),
            source,
        }),
        Err(join_err) => Err(RunError::Io {
            command: command.to_string(),
            source: std::io::Error::other(join_err),
        }),
    }
}

fn kill_process_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", raw, e),
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(command: &str) -> CommandSpec {
        CommandSpec::new(command).with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let runner = ShellRunner::new();
        let outcome = runner
            .execute(&spec("echo out; echo err 1>&2"))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, b"out\n");
        assert_eq!(outcome.stderr, b"err\n");
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let runner = ShellRunner::new();
        let outcome = runner
            .execute(&spec("cat").with_stdin("hello_123\n"))
            .await
            .unwrap();

        assert_eq!(outcome.stdout_lossy(), "hello_123\n");
    }

    #[tokio::test]
    async fn test_ignores_unread_stdin() {
        let runner = ShellRunner::new();
        let outcome = runner
            .execute(&spec("echo done").with_stdin(vec![b'x'; 1 << 20]))
            .await
            .unwrap();

        assert_eq!(outcome.stdout_lossy(), "done\n");
    }

    #[tokio::test]
    async fn test_reports_exit_code() {
        let runner = ShellRunner::new();
        let outcome = runner.execute(&spec("exit 42")).await.unwrap();

        assert_eq!(outcome.exit_code, 42);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = ShellRunner::new();
        let err = runner
            .execute(&spec("sleep 5").with_timeout(Duration::from_millis(200)))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_background_child_cannot_outlive_limit() {
        let runner = ShellRunner::new();
        let started = std::time::Instant::now();
        let outcome = runner
            .execute(&spec("sleep 4 & echo hi").with_timeout(Duration::from_millis(500)))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.stdout_lossy(), "hi\n");
    }

    #[tokio::test]
    async fn test_runs_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let runner = ShellRunner::new();
        let outcome = runner
            .execute(&spec("cat marker.txt").with_work_dir(dir.path()))
            .await
            .unwrap();

        assert_eq!(outcome.stdout_lossy(), "here");
    }

    #[tokio::test]
    async fn test_discards_output_when_not_capturing() {
        let runner = ShellRunner::new();
        let outcome = runner
            .execute(&spec("echo hidden").with_capture_output(false))
            .await
            .unwrap();

        assert!(outcome.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_timeout() {
        let runner = ShellRunner::new().shell("/nonexistent/shell");
        let err = runner.execute(&spec("true")).await.unwrap_err();

        assert!(matches!(err, RunError::Spawn { .. }));
    }
}
