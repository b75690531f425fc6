use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// The five states a job can occupy. See the lifecycle rules in the crate
/// root docs for the transitions a state machine implementation must honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    /// Whether a job in this state may be claimed (pending or failed),
    /// ignoring readiness (`run_at`/`next_run_at`).
    pub fn is_claimable(self) -> bool {
        matches!(self, JobState::Pending | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(QueueError::MalformedJob(format!(
                "unknown job state {other:?}"
            ))),
        }
    }
}

/// A persistent job record. Field names and types mirror the store schema
/// directly; there is no separate "DTO" layer because the core crate has no
/// backend of its own to diverge from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: Option<i64>,
    pub priority: i64,
    pub tags: Option<String>,
    pub run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub output_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The enqueue-time input document. Deserialized straight from the caller's
/// JSON; unknown keys are ignored by serde's default behavior, matching the
/// "preserved only if the schema carries them" rule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub state: Option<JobState>,
    #[serde(default)]
    pub attempts: Option<i64>,
    #[serde(default)]
    pub max_retries: Option<i64>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output_file: Option<String>,
}

impl NewJob {
    /// Parses an enqueue document from JSON text, mapping any structural
    /// problem (bad JSON, or a missing `id`/`command`) to `MalformedJob`.
    pub fn from_json(text: &str) -> Result<Self, QueueError> {
        let new_job: NewJob = serde_json::from_str(text)
            .map_err(|e| QueueError::MalformedJob(e.to_string()))?;
        if new_job.id.trim().is_empty() {
            return Err(QueueError::MalformedJob("job id must not be empty".into()));
        }
        if new_job.command.trim().is_empty() {
            return Err(QueueError::MalformedJob(
                "job command must not be empty".into(),
            ));
        }
        Ok(new_job)
    }

    /// Flattens `tags` into the comma-joined string the store persists.
    pub fn tags_string(&self) -> Option<String> {
        self.tags.as_ref().map(|tags| tags.join(","))
    }
}
