use std::process::Stdio;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use queuectl_core::{home, worker_identity, JobState, NewJob, QueueError};
use queuectl_store::{SqliteStore, Store};
use queuectl_worker::Supervisor;

use crate::cli::{Command, ConfigCommand, DlqCommand, MetricsCommand, WorkerCommand};
use crate::metrics;

/// Opens (and idempotently initializes) the store at `~/.queuectl/queue.db`.
async fn open_store() -> Result<SqliteStore, QueueError> {
    let store = SqliteStore::connect(&home::db_path()).await?;
    store.init().await?;
    Ok(store)
}

fn read_pid() -> Option<u32> {
    std::fs::read_to_string(home::pid_path())
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn write_pid(pid: u32) -> std::io::Result<()> {
    std::fs::create_dir_all(home::queuectl_dir())?;
    std::fs::write(home::pid_path(), pid.to_string())
}

/// Dispatches a parsed [`Command`], returning the process exit code.
pub async fn run(command: Command) -> Result<i32, QueueError> {
    match command {
        Command::Enqueue { json } => enqueue(&json).await,
        Command::Worker(WorkerCommand::Start { count, daemon }) => {
            worker_start(count, daemon).await
        }
        Command::Worker(WorkerCommand::Stop) => worker_stop(),
        Command::Status => status().await,
        Command::List { state } => list(state).await,
        Command::Dlq(DlqCommand::List) => dlq_list().await,
        Command::Dlq(DlqCommand::Retry { job_id }) => dlq_retry(&job_id).await,
        Command::Config(ConfigCommand::Set { key, value }) => config_set(&key, &value).await,
        Command::Metrics(MetricsCommand::Serve { port }) => metrics_serve(port).await,
        Command::RunWorker { index } => run_worker(index).await,
        Command::RunDaemon { count } => run_daemon(count).await,
    }
}

async fn enqueue(json: &str) -> Result<i32, QueueError> {
    let store = open_store().await?;
    let new_job = NewJob::from_json(json)?;
    let job = store.insert_job(new_job).await?;
    println!("Enqueued {}", job.id);
    Ok(0)
}

async fn worker_start(count: usize, daemon: bool) -> Result<i32, QueueError> {
    let exe = current_exe()?;
    if daemon {
        let dir = home::queuectl_dir();
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(home::daemon_stdout_path())
            .map_err(io_err)?;
        let stderr = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(home::daemon_stderr_path())
            .map_err(io_err)?;

        let child = std::process::Command::new(&exe)
            .arg("run-daemon")
            .arg("--count")
            .arg(count.to_string())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(io_err)?;

        write_pid(child.id()).map_err(io_err)?;
        println!("Started daemon pid {}", child.id());
        println!(
            "Daemon logs: {} {}",
            home::daemon_stdout_path().display(),
            home::daemon_stderr_path().display()
        );
        Ok(0)
    } else {
        println!("Starting {count} workers (foreground). Ctrl+C to stop");
        open_store().await?;
        Supervisor::new(exe, count).run().await.map_err(io_err)?;
        Ok(0)
    }
}

fn worker_stop() -> Result<i32, QueueError> {
    let Some(pid) = read_pid() else {
        println!("No daemon PID file found");
        return Ok(1);
    };
    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => {
            println!("Sent SIGTERM to pid {pid}");
            let _ = std::fs::remove_file(home::pid_path());
            Ok(0)
        }
        Err(e) => {
            println!("Failed to stop daemon: {e}");
            Ok(1)
        }
    }
}

async fn status() -> Result<i32, QueueError> {
    let store = open_store().await?;
    let counts = store.counts().await?;
    println!("Jobs:");
    for state in JobState::ALL {
        println!("  {}: {}", state, counts.get(&state).copied().unwrap_or(0));
    }
    match read_pid() {
        Some(pid) => println!("Daemon PID: {pid}"),
        None => println!("No daemon running"),
    }
    Ok(0)
}

async fn list(state: Option<String>) -> Result<i32, QueueError> {
    let store = open_store().await?;
    let state = state.map(|s| s.parse::<JobState>()).transpose()?;
    for job in store.list(state).await? {
        println!("{}", serde_json::to_string(&job).map_err(|e| QueueError::Store(e.to_string()))?);
    }
    Ok(0)
}

async fn dlq_list() -> Result<i32, QueueError> {
    list(Some("dead".to_string())).await
}

async fn dlq_retry(job_id: &str) -> Result<i32, QueueError> {
    let store = open_store().await?;
    let job = store.move_dead_to_pending(job_id).await?;
    println!("Moved to pending: {}", job.id);
    Ok(0)
}

async fn config_set(key: &str, value: &str) -> Result<i32, QueueError> {
    let store = open_store().await?;
    store.set_config(key, value).await?;
    println!("Set {key} {value}");
    Ok(0)
}

async fn metrics_serve(port: u16) -> Result<i32, QueueError> {
    let store = open_store().await?;
    let store: Arc<dyn Store> = Arc::new(store);
    let app = metrics::router(store);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(io_err)?;
    println!("Metrics server listening on 0.0.0.0:{port} (endpoint /metrics)");
    axum::serve(listener, app).await.map_err(io_err)?;
    Ok(0)
}

async fn run_worker(index: usize) -> Result<i32, QueueError> {
    let store = open_store().await?;
    let store: Arc<dyn Store> = Arc::new(store);
    let worker_id = worker_identity(std::process::id(), index);

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())
        .map_err(io_err)?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())
        .map_err(io_err)?;

    queuectl_worker::run_worker_loop(store, &worker_id, shutdown).await;
    Ok(0)
}

async fn run_daemon(count: usize) -> Result<i32, QueueError> {
    open_store().await?;
    write_pid(std::process::id()).map_err(io_err)?;
    println!("Daemon running pid {}", std::process::id());

    let exe = current_exe()?;
    let result = Supervisor::new(exe, count).run().await;
    let _ = std::fs::remove_file(home::pid_path());
    result.map_err(io_err)?;
    Ok(0)
}

fn current_exe() -> Result<std::path::PathBuf, QueueError> {
    std::env::current_exe().map_err(io_err)
}

fn io_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `open_store` resolves its path from $HOME; serialize tests that
    // mutate it so they don't race each other within one test binary.
    static HOME_GUARD: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn enqueue_then_list_round_trips() {
        let _guard = HOME_GUARD.lock().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        std::env::set_var("HOME", dir.path());

        let code = enqueue(r#"{"id":"cli-job","command":"true"}"#).await.unwrap();
        assert_eq!(code, 0);

        let store = open_store().await.unwrap();
        let job = store.get("cli-job").await.unwrap().unwrap();
        assert_eq!(job.command, "true");
    }

    #[tokio::test]
    async fn dlq_retry_on_non_dead_job_is_user_error() {
        let _guard = HOME_GUARD.lock().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        std::env::set_var("HOME", dir.path());

        enqueue(r#"{"id":"alive","command":"true"}"#).await.unwrap();
        let err = dlq_retry("alive").await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
