//! # queuectl-worker
//!
//! The long-lived worker loop (claim → execute → record outcome) and the
//! [`Supervisor`] that launches `count` of them as independent OS processes
//! and propagates shutdown signals to them.

mod supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use queuectl_core::config::{self, Config};
use queuectl_store::Store;

pub use supervisor::Supervisor;

/// Runs one worker's tick loop until `shutdown` is set. The shutdown flag
/// is only observed *between* jobs — a job already claimed runs to
/// completion (or its own timeout) before the loop exits.
pub async fn run_worker_loop(store: Arc<dyn Store>, worker_id: &str, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!(worker_id, "shutdown flag observed, exiting");
            return;
        }

        let now = queuectl_core::now_utc();
        let claimed = match store.claim(worker_id, now).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "claim failed, will retry");
                None
            }
        };

        let Some(job) = claimed else {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        };

        let attempts_after = job.attempts + 1;
        let cfg = resolve_config(store.as_ref()).await;
        let log_path = queuectl_core::home::log_path_for(&job.id);

        tracing::info!(worker_id, job_id = %job.id, attempt = attempts_after, "executing job");
        let outcome =
            queuectl_executor::execute_job(&job.command, cfg.job_timeout_secs, &log_path).await;

        if outcome.is_success() {
            let output = outcome.output_text().to_string();
            if let Err(e) = store.complete(&job.id, Some(output)).await {
                tracing::error!(worker_id, job_id = %job.id, error = %e, "failed to record completion");
            }
        } else {
            let output = outcome.output_text().to_string();
            let now = queuectl_core::now_utc();
            if let Err(e) = store
                .fail(
                    &job.id,
                    attempts_after,
                    job.max_retries,
                    cfg.backoff_base,
                    Some(output),
                    now,
                )
                .await
            {
                tracing::error!(worker_id, job_id = %job.id, error = %e, "failed to record failure");
            }
        }
        // No sleep after a processed job: keep pulling while work is eligible.
    }
}

/// Reads `job-timeout` and `backoff-base` fresh from the store on every
/// tick — configuration is never cached in the worker so `config set`
/// takes effect on the very next job.
async fn resolve_config(store: &dyn Store) -> Config {
    let timeout = store
        .get_config(config::JOB_TIMEOUT_KEY)
        .await
        .ok()
        .flatten();
    let backoff = store
        .get_config(config::BACKOFF_BASE_KEY)
        .await
        .ok()
        .flatten();

    let defaults = Config::default();
    Config {
        job_timeout_secs: config::parse_u64_or(timeout.as_deref(), defaults.job_timeout_secs),
        backoff_base: config::parse_i64_or(backoff.as_deref(), defaults.backoff_base),
        ..defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::{JobState, NewJob};
    use queuectl_testing::{new_job, new_job_with_priority, temp_store};

    #[tokio::test]
    async fn successful_job_transitions_to_completed() {
        let (store, _dir) = temp_store().await;
        let store: Arc<dyn Store> = Arc::new(store);
        store.insert_job(new_job("ok", "true")).await.unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        // Run the loop briefly, then ask it to stop; with one eligible job
        // it should process it and start idle-sleeping before we cancel.
        let handle = tokio::spawn({
            let store = store.clone();
            async move { run_worker_loop(store, "test-worker", shutdown_clone).await }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.store(true, Ordering::SeqCst);
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        let job = store.get("ok").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
    }

    #[tokio::test]
    async fn failing_job_schedules_retry() {
        let (store, _dir) = temp_store().await;
        let store: Arc<dyn Store> = Arc::new(store);
        store
            .insert_job(
                NewJob::from_json(r#"{"id":"bad","command":"exit 1","max_retries":5}"#).unwrap(),
            )
            .await
            .unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn({
            let store = store.clone();
            async move { run_worker_loop(store, "test-worker", shutdown_clone).await }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.store(true, Ordering::SeqCst);
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        let job = store.get("bad").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.next_run_at.is_some());
    }

    #[tokio::test]
    async fn loop_drains_both_eligible_jobs_highest_priority_first() {
        let (store, _dir) = temp_store().await;
        let store: Arc<dyn Store> = Arc::new(store);
        store
            .insert_job(new_job_with_priority("low", "true", 1))
            .await
            .unwrap();
        store
            .insert_job(new_job_with_priority("high", "true", 10))
            .await
            .unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn({
            let store = store.clone();
            async move { run_worker_loop(store, "test-worker", shutdown_clone).await }
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.store(true, Ordering::SeqCst);
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        let high = store.get("high").await.unwrap().unwrap();
        let low = store.get("low").await.unwrap().unwrap();
        assert_eq!(high.state, JobState::Completed);
        assert_eq!(low.state, JobState::Completed);
        assert!(high.updated_at <= low.updated_at);
    }
}
