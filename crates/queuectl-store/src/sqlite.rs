use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{config, decide_retry, Job, JobState, NewJob, QueueError, RetryDecision};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::Store;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    command TEXT NOT NULL,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER,
    priority INTEGER NOT NULL DEFAULT 0,
    tags TEXT,
    run_at TEXT,
    next_run_at TEXT,
    locked_by TEXT,
    locked_at TEXT,
    output TEXT,
    output_file TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (state, priority, created_at);

CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

fn store_err(e: sqlx::Error) -> QueueError {
    QueueError::Store(e.to_string())
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, QueueError> {
    let state: String = row.try_get("state").map_err(store_err)?;
    let state: JobState = state.parse()?;
    Ok(Job {
        id: row.try_get("id").map_err(store_err)?,
        command: row.try_get("command").map_err(store_err)?,
        state,
        attempts: row.try_get("attempts").map_err(store_err)?,
        max_retries: row.try_get("max_retries").map_err(store_err)?,
        priority: row.try_get("priority").map_err(store_err)?,
        tags: row.try_get("tags").map_err(store_err)?,
        run_at: row.try_get("run_at").map_err(store_err)?,
        next_run_at: row.try_get("next_run_at").map_err(store_err)?,
        locked_by: row.try_get("locked_by").map_err(store_err)?,
        locked_at: row.try_get("locked_at").map_err(store_err)?,
        output: row.try_get("output").map_err(store_err)?,
        output_file: row.try_get("output_file").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

/// A [`Store`] backed by a single embedded SQLite file, opened in WAL mode
/// with a short busy timeout so lock contention between worker processes
/// surfaces quickly as `SQLITE_BUSY` instead of hanging a whole tick.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the SQLite file at `db_path`.
    pub async fn connect(db_path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| QueueError::Store(e.to_string()))?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(store_err)?;

        Ok(SqliteStore { pool })
    }

    /// Wraps an already-configured pool, mainly for tests that want a
    /// shared in-memory-backed pool across connections.
    pub fn from_pool(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The actual claim transaction. Returns `Err` only for genuine backend
    /// trouble; a lost race or nothing-eligible both come back as `Ok(None)`
    /// from the caller after this function's `sqlx::Error`s are swallowed.
    async fn try_claim(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<sqlx::sqlite::SqliteRow>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let selected: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM jobs \
             WHERE (state = 'pending' OR state = 'failed') \
               AND (next_run_at IS NULL OR next_run_at <= ?1) \
               AND (run_at IS NULL OR run_at <= ?1) \
             ORDER BY priority DESC, created_at ASC \
             LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((job_id,)) = selected else {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            return Ok(None);
        };

        let update = sqlx::query(
            "UPDATE jobs SET state = 'processing', locked_by = ?1, locked_at = ?2, updated_at = ?2 \
             WHERE id = ?3 AND (state = 'pending' OR state = 'failed')",
        )
        .bind(worker_id)
        .bind(now)
        .bind(&job_id)
        .execute(&mut *conn)
        .await?;

        if update.rows_affected() != 1 {
            // Lost the race to a peer worker between select and update.
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(&job_id)
            .fetch_one(&mut *conn)
            .await?;
        sqlx::query("COMMIT").execute(&mut *conn).await?;

        Ok(Some(row))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<(), QueueError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        for key in config::KEYS {
            let default = config::default_value(key).expect("known config key");
            sqlx::query("INSERT OR IGNORE INTO config(key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(default)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    async fn insert_job(&self, new_job: NewJob) -> Result<Job, QueueError> {
        let now = Utc::now();
        let max_retries = match new_job.max_retries {
            Some(v) => Some(v),
            None => {
                let cfg = self.get_config(config::DEFAULT_MAX_RETRIES_KEY).await?;
                Some(config::parse_i64_or(cfg.as_deref(), 3))
            }
        };
        let state = new_job.state.unwrap_or(JobState::Pending);
        let tags = new_job.tags_string();

        let result = sqlx::query(
            "INSERT INTO jobs \
             (id, command, state, attempts, max_retries, priority, tags, run_at, \
              next_run_at, locked_by, locked_at, output, output_file, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, NULL, NULL, ?9, ?10, ?10)",
        )
        .bind(&new_job.id)
        .bind(&new_job.command)
        .bind(state.as_str())
        .bind(new_job.attempts.unwrap_or(0))
        .bind(max_retries)
        .bind(new_job.priority.unwrap_or(0))
        .bind(tags)
        .bind(new_job.run_at)
        .bind(&new_job.output_file)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(QueueError::Duplicate(new_job.id));
            }
            Err(e) => return Err(store_err(e)),
        }

        self.get(&new_job.id)
            .await?
            .ok_or_else(|| QueueError::Store("inserted job vanished".into()))
    }

    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        match self.try_claim(worker_id, now).await {
            Ok(Some(row)) => row_to_job(row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                // Transient contention (e.g. SQLITE_BUSY on BEGIN IMMEDIATE)
                // is reported as "nothing to do"; the worker retries next tick.
                tracing::debug!(worker_id, error = %e, "claim attempt found no job");
                Ok(None)
            }
        }
    }

    async fn complete(&self, job_id: &str, output: Option<String>) -> Result<(), QueueError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET state = 'completed', output = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(output)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        new_attempts: i64,
        max_retries: Option<i64>,
        backoff_base: i64,
        output: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let max_retries = match max_retries {
            Some(v) => v,
            None => {
                let cfg = self.get_config(config::DEFAULT_MAX_RETRIES_KEY).await?;
                config::parse_i64_or(cfg.as_deref(), 3)
            }
        };

        let result = match decide_retry(new_attempts, max_retries, backoff_base, now) {
            RetryDecision::Dead => sqlx::query(
                "UPDATE jobs SET state = 'dead', attempts = ?1, updated_at = ?2, output = ?3 \
                 WHERE id = ?4",
            )
            .bind(new_attempts)
            .bind(now)
            .bind(output)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?,
            RetryDecision::Retry { next_run_at } => sqlx::query(
                "UPDATE jobs SET state = 'failed', attempts = ?1, next_run_at = ?2, \
                 updated_at = ?3, output = ?4 WHERE id = ?5",
            )
            .bind(new_attempts)
            .bind(next_run_at)
            .bind(now)
            .bind(output)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?,
        };

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        let rows = match state {
            Some(state) => sqlx::query("SELECT * FROM jobs WHERE state = ?1 ORDER BY priority DESC, created_at ASC")
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?,
            None => sqlx::query("SELECT * FROM jobs ORDER BY priority DESC, created_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?,
        };
        rows.into_iter().map(row_to_job).collect()
    }

    async fn counts(&self) -> Result<HashMap<JobState, i64>, QueueError> {
        let rows = sqlx::query("SELECT state, COUNT(*) as n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut counts: HashMap<JobState, i64> =
            JobState::ALL.into_iter().map(|s| (s, 0)).collect();
        for row in rows {
            let state: String = row.try_get("state").map_err(store_err)?;
            let n: i64 = row.try_get("n").map_err(store_err)?;
            if let Ok(state) = state.parse::<JobState>() {
                counts.insert(state, n);
            }
        }
        Ok(counts)
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(row_to_job).transpose()
    }

    async fn move_dead_to_pending(&self, job_id: &str) -> Result<Job, QueueError> {
        let existing = self
            .get(job_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        if existing.state != JobState::Dead {
            return Err(QueueError::WrongState {
                id: job_id.to_string(),
                state: existing.state.to_string(),
            });
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE jobs SET state = 'pending', attempts = 0, next_run_at = NULL, updated_at = ?1 \
             WHERE id = ?2 AND state = 'dead'",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        self.get(job_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>, QueueError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO config(key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}
