//! Layout of the persisted state directory rooted at `$HOME/.queuectl`.
//!
//! `HOME` is the single environment input that drives core behavior (see
//! the crate's parent design notes); every other path in the system is
//! derived from it here so there is exactly one place that reads the
//! environment.

use std::path::PathBuf;

/// Base directory, `$HOME/.queuectl`. Panics if `HOME` is unset, matching
/// the reference implementation's reliance on `os.path.expanduser("~")`
/// always resolving on a single-host deployment.
pub fn queuectl_dir() -> PathBuf {
    let home = std::env::var_os("HOME").expect("HOME must be set");
    PathBuf::from(home).join(".queuectl")
}

pub fn db_path() -> PathBuf {
    queuectl_dir().join("queue.db")
}

pub fn logs_dir() -> PathBuf {
    queuectl_dir().join("logs")
}

pub fn log_path_for(job_id: &str) -> PathBuf {
    logs_dir().join(format!("{job_id}.log"))
}

pub fn pid_path() -> PathBuf {
    queuectl_dir().join("pid")
}

pub fn daemon_stdout_path() -> PathBuf {
    queuectl_dir().join("daemon.out")
}

pub fn daemon_stderr_path() -> PathBuf {
    queuectl_dir().join("daemon.err")
}
