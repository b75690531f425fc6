use clap::{Parser, Subcommand};

/// A durable, single-host job queue: enqueue shell-command jobs, run them
/// under a pool of workers with retries and a dead-letter queue.
#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enqueue a job from a JSON document (`{"id":..., "command":...}`).
    Enqueue {
        /// The job document as a JSON string.
        json: String,
    },

    /// Manage the worker pool.
    #[command(subcommand)]
    Worker(WorkerCommand),

    /// Print job counts per state and the daemon PID, if any.
    Status,

    /// List jobs, optionally filtered to one state.
    List {
        #[arg(long)]
        state: Option<String>,
    },

    /// Inspect and requeue dead-lettered jobs.
    #[command(subcommand)]
    Dlq(DlqCommand),

    /// Mutate persisted configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Serve the read-only metrics HTTP endpoint.
    #[command(subcommand)]
    Metrics(MetricsCommand),

    /// Internal: runs a single worker loop. Used only by the supervisor's
    /// own re-exec; not part of the documented surface.
    #[command(name = "run-worker", hide = true)]
    RunWorker {
        #[arg(long)]
        index: usize,
    },

    /// Internal: runs the supervisor in the foreground. Used only by
    /// `worker start --daemon`'s detached child process.
    #[command(name = "run-daemon", hide = true)]
    RunDaemon {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Start `count` workers, in the foreground or as a detached daemon.
    Start {
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long)]
        daemon: bool,
    },
    /// Signal a running daemon (via its PID file) to shut down.
    Stop,
}

#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List every job currently in the dead-letter queue.
    List,
    /// Move a dead job back to `pending` with `attempts` reset to 0.
    Retry {
        job_id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Set a configuration key (`default-max-retries`, `backoff-base`,
    /// `job-timeout`) to a new value.
    Set {
        key: String,
        value: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum MetricsCommand {
    /// Serve `GET /metrics` returning a JSON object of state to count.
    Serve {
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}
