//! Task runner
//!
//! Executes one task attempt as a child process. Secrets reach the child
//! only through its environment; the result carries exit status and the
//! captured (truncated) output, never the environment.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long output collection may lag behind process exit
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Parent variables a task inherits; everything else must be declared
const INHERITED_ENV: &[&str] = &["PATH", "HOME", "USER", "LANG", "LC_ALL", "TZ", "TMPDIR"];

/// Fully rendered task attempt
#[derive(Clone)]
pub struct TaskInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Non-secret environment entries
    pub env: BTreeMap<String, String>,
    /// Secret environment entries, values never logged
    pub secret_env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl std::fmt::Debug for TaskInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskInvocation")
            .field("program", &self.program)
            .field("args", &self.args.len())
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("secret_env", &self.secret_env.keys().collect::<Vec<_>>())
            .field("working_dir", &self.working_dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    /// Killed by a signal without an exit code
    Signalled,
    TimedOut,
    Cancelled,
    SpawnFailed(String),
}

/// Outcome of one task attempt
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl TaskResult {
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => Some(code),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.termination == Termination::Exited(0)
    }

    /// One-line description of a failed attempt
    pub fn describe(&self) -> String {
        match &self.termination {
            Termination::Exited(code) => format!("exited with code {}", code),
            Termination::Signalled => "terminated by signal".to_string(),
            Termination::TimedOut => {
                format!("timed out after {}s", self.duration.as_secs())
            }
            Termination::Cancelled => "cancelled".to_string(),
            Termination::SpawnFailed(e) => format!("failed to start: {}", e),
        }
    }
}

/// Executes task attempts
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Runs the invocation until it exits, times out or `cancel` fires
    async fn execute(&self, invocation: &TaskInvocation, cancel: &CancellationToken)
    -> TaskResult;
}

/// Runs tasks as local child processes
pub struct ProcessTaskRunner {
    output_limit: usize,
}

impl ProcessTaskRunner {
    pub fn new(output_limit: usize) -> Self {
        Self { output_limit }
    }

    fn command(&self, invocation: &TaskInvocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.env_clear();
        for key in INHERITED_ENV {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }

        cmd.envs(&invocation.env);
        cmd.envs(&invocation.secret_env);

        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Default for ProcessTaskRunner {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

#[async_trait]
impl TaskRunner for ProcessTaskRunner {
    async fn execute(
        &self,
        invocation: &TaskInvocation,
        cancel: &CancellationToken,
    ) -> TaskResult {
        let start = Instant::now();

        tracing::debug!(
            program = %invocation.program,
            timeout_secs = invocation.timeout.as_secs(),
            "Spawning task process"
        );

        let mut child = match self.command(invocation).spawn() {
            Ok(child) => child,
            Err(e) => {
                return TaskResult {
                    termination: Termination::SpawnFailed(e.to_string()),
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: start.elapsed(),
                };
            }
        };

        let limit = self.output_limit;
        let stdout = child.stdout.take().map(|s| tokio::spawn(capture(s, limit)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(capture(s, limit)));

        enum ExitReason {
            Completed(std::process::ExitStatus),
            WaitError(std::io::Error),
            Timeout,
            Cancelled,
        }

        let exit_reason = tokio::select! {
            wait_result = child.wait() => match wait_result {
                Ok(status) => ExitReason::Completed(status),
                Err(e) => ExitReason::WaitError(e),
            },
            _ = tokio::time::sleep(invocation.timeout) => ExitReason::Timeout,
            _ = cancel.cancelled() => ExitReason::Cancelled,
        };

        let termination = match exit_reason {
            ExitReason::Completed(status) => match status.code() {
                Some(code) => Termination::Exited(code),
                None => Termination::Signalled,
            },
            ExitReason::WaitError(e) => Termination::SpawnFailed(e.to_string()),
            ExitReason::Timeout => {
                tracing::warn!(
                    program = %invocation.program,
                    timeout_secs = invocation.timeout.as_secs(),
                    "Task timed out, killing process"
                );
                kill(&mut child).await;
                Termination::TimedOut
            }
            ExitReason::Cancelled => {
                tracing::info!(program = %invocation.program, "Task cancelled, killing process");
                kill(&mut child).await;
                Termination::Cancelled
            }
        };

        let duration = start.elapsed();
        TaskResult {
            termination,
            stdout: join_capture(stdout).await,
            stderr: join_capture(stderr).await,
            duration,
        }
    }
}

async fn kill(child: &mut tokio::process::Child) {
    // The process may already have exited
    if let Err(e) = child.kill().await {
        tracing::debug!("Failed to kill task process: {}", e);
    }
}

/// Reads a stream to the end, keeping at most `limit` bytes
async fn capture<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    let mut truncated = false;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                tracing::warn!("Error reading task output: {}", e);
                break;
            }
        }
    }

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str("\n... [truncated]");
    }
    text
}

/// Collects captured output, giving up when grandchildren keep the pipe open
async fn join_capture(handle: Option<tokio::task::JoinHandle<String>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };

    match tokio::time::timeout(OUTPUT_GRACE, &mut handle).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}
