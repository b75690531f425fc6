//! # queuectl-executor
//!
//! Runs exactly one claimed job as an external process. The executor never
//! touches a job row — it takes a command and a timeout, and returns an
//! [`ExecOutcome`]; the worker loop decides what that means for the job's
//! state.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// What happened when a job's command was run.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    /// Exit code 0.
    Success { output: String },
    /// Non-zero exit code.
    NonZeroExit { code: Option<i32>, output: String },
    /// The wall-clock timeout elapsed before the command finished; the
    /// process (and anything it spawned) has been killed.
    Timeout { output: String },
    /// The shell itself could not be spawned.
    SpawnFailure { message: String },
}

impl ExecOutcome {
    /// Whether the worker loop should call `complete` (only on `Success`)
    /// rather than `fail`.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecOutcome::Success { .. })
    }

    /// The text that belongs in the job's `output` field and log file.
    pub fn output_text(&self) -> &str {
        match self {
            ExecOutcome::Success { output }
            | ExecOutcome::NonZeroExit { output, .. }
            | ExecOutcome::Timeout { output } => output,
            ExecOutcome::SpawnFailure { message } => message,
        }
    }
}

/// Runs `command` through a shell (`sh -c`) with a wall-clock timeout of
/// `timeout_secs` seconds, writing the captured combined output to
/// `log_path` (overwriting any prior content) regardless of outcome.
pub async fn execute_job(command: &str, timeout_secs: u64, log_path: &Path) -> ExecOutcome {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let message = format!("failed to spawn command: {e}");
            write_log(log_path, &message).await;
            return ExecOutcome::SpawnFailure { message };
        }
    };

    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let outcome = tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => {
                    let output = join_output(stdout_task, stderr_task).await;
                    if status.success() {
                        ExecOutcome::Success { output }
                    } else {
                        ExecOutcome::NonZeroExit { code: status.code(), output }
                    }
                }
                Err(e) => ExecOutcome::SpawnFailure { message: e.to_string() },
            }
        }
        _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let captured = join_output(stdout_task, stderr_task).await;
            let output = format!("Job timed out after {timeout_secs}s\n{captured}");
            ExecOutcome::Timeout { output }
        }
    };

    write_log(log_path, outcome.output_text()).await;
    outcome
}

async fn join_output(
    stdout_task: tokio::task::JoinHandle<Vec<u8>>,
    stderr_task: tokio::task::JoinHandle<Vec<u8>>,
) -> String {
    let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);
    let mut combined = stdout.unwrap_or_default();
    combined.extend(stderr.unwrap_or_default());
    String::from_utf8_lossy(&combined).into_owned()
}

async fn write_log(log_path: &Path, content: &str) {
    if let Some(parent) = log_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!(path = %log_path.display(), error = %e, "failed to create log directory");
            return;
        }
    }
    if let Err(e) = tokio::fs::write(log_path, content).await {
        tracing::warn!(path = %log_path.display(), error = %e, "failed to write job log");
    }
}
