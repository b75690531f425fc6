//! # queuectl-store
//!
//! Durable persistence for jobs and config, built around the [`Store`]
//! trait. [`SqliteStore`] is the only implementation today: a single
//! embedded SQLite file, opened in WAL mode, that makes the claim protocol
//! (§ [`Store::claim`]) safe across concurrent worker processes without any
//! coordination above the database itself.

mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{Job, JobState, NewJob, QueueError};

pub use sqlite::SqliteStore;

/// The persistence seam every worker, CLI command and test harness goes
/// through. A transaction-backed relational store is assumed; see
/// [`SqliteStore`] for the concrete contract each method must uphold.
#[async_trait]
pub trait Store: Send + Sync {
    /// Ensures schema and seed config exist. Idempotent; safe to call from
    /// every process before first use.
    async fn init(&self) -> Result<(), QueueError>;

    /// Persists a new job, defaulting `state` to `pending` and filling
    /// `max_retries` from config when the caller didn't supply one. Fails
    /// with [`QueueError::Duplicate`] if `id` already exists.
    async fn insert_job(&self, new_job: NewJob) -> Result<Job, QueueError>;

    /// The atomic claim primitive: picks the single highest-priority,
    /// oldest eligible job and transitions it to `processing` under
    /// `worker_id`, or returns `None` if nothing is eligible or a peer
    /// worker won the race.
    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, QueueError>;

    /// Transitions a job to `completed`, recording `output`.
    async fn complete(&self, job_id: &str, output: Option<String>) -> Result<(), QueueError>;

    /// Applies the retry policy: transitions to `dead` once
    /// `new_attempts >= max_retries`, otherwise to `failed` with a computed
    /// `next_run_at`. `max_retries` of `None` falls back to
    /// `default-max-retries` from config.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        job_id: &str,
        new_attempts: i64,
        max_retries: Option<i64>,
        backoff_base: i64,
        output: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Lists jobs, optionally filtered to one state, ordered by priority
    /// descending then `created_at` ascending.
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError>;

    /// Counts jobs per state; states with zero jobs are still present with
    /// a count of `0`.
    async fn counts(&self) -> Result<HashMap<JobState, i64>, QueueError>;

    async fn get(&self, job_id: &str) -> Result<Option<Job>, QueueError>;

    /// Moves a `dead` job back to `pending`, resetting `attempts` to `0`
    /// and clearing `next_run_at`. Refuses with
    /// [`QueueError::WrongState`] if the job is not currently `dead`.
    async fn move_dead_to_pending(&self, job_id: &str) -> Result<Job, QueueError>;

    async fn get_config(&self, key: &str) -> Result<Option<String>, QueueError>;

    async fn set_config(&self, key: &str, value: &str) -> Result<(), QueueError>;
}
