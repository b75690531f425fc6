use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use queuectl_core::{JobState, NewJob};
use queuectl_store::{SqliteStore, Store};
use tempfile::TempDir;

async fn new_store() -> (SqliteStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::connect(&dir.path().join("queue.db"))
        .await
        .unwrap();
    store.init().await.unwrap();
    (store, dir)
}

fn job(id: &str, priority: i64) -> NewJob {
    NewJob::from_json(&format!(
        r#"{{"id":"{id}","command":"true","priority":{priority}}}"#
    ))
    .unwrap()
}

// Higher priority wins; ties are broken by insertion order.
#[tokio::test]
async fn claims_in_priority_then_created_at_order() {
    let (store, _dir) = new_store().await;
    store.insert_job(job("low", 1)).await.unwrap();
    store.insert_job(job("high", 10)).await.unwrap();
    store.insert_job(job("mid", 5)).await.unwrap();

    let now = Utc::now();
    let first = store.claim("t", now).await.unwrap().unwrap();
    store.complete(&first.id, Some("ok".into())).await.unwrap();
    let second = store.claim("t", now).await.unwrap().unwrap();
    store.complete(&second.id, Some("ok".into())).await.unwrap();
    let third = store.claim("t", now).await.unwrap().unwrap();
    store.complete(&third.id, Some("ok".into())).await.unwrap();

    assert_eq!(
        vec![first.id, second.id, third.id],
        vec!["high", "mid", "low"]
    );
}

#[tokio::test]
async fn ties_broken_by_created_at_ascending() {
    let (store, _dir) = new_store().await;
    store.insert_job(job("first", 0)).await.unwrap();
    // sqlite second-precision timestamps can collide; insert sequentially regardless.
    store.insert_job(job("second", 0)).await.unwrap();

    let now = Utc::now();
    let first = store.claim("t", now).await.unwrap().unwrap();
    assert_eq!(first.id, "first");
}

// A job scheduled in the future is not eligible for claim yet.
#[tokio::test]
async fn future_run_at_is_not_claimable() {
    let (store, _dir) = new_store().await;
    let future = Utc::now() + ChronoDuration::hours(1);
    let new_job = NewJob::from_json(&format!(
        r#"{{"id":"later","command":"true","run_at":"{}"}}"#,
        future.to_rfc3339()
    ))
    .unwrap();
    store.insert_job(new_job).await.unwrap();

    let claimed = store.claim("t", Utc::now()).await.unwrap();
    assert!(claimed.is_none());
}

// Retry then dead-letter once attempts exhaust max_retries.
#[tokio::test]
async fn retries_then_dies_after_max_retries() {
    let (store, _dir) = new_store().await;
    let new_job = NewJob::from_json(r#"{"id":"x","command":"false","max_retries":2}"#).unwrap();
    store.insert_job(new_job).await.unwrap();

    let t0 = Utc::now();
    let claimed = store.claim("w", t0).await.unwrap().unwrap();
    assert_eq!(claimed.attempts, 0);
    store
        .fail(&claimed.id, 1, Some(2), 2, Some("boom".into()), t0)
        .await
        .unwrap();
    let after1 = store.get("x").await.unwrap().unwrap();
    assert_eq!(after1.state, JobState::Failed);
    assert_eq!(after1.attempts, 1);
    assert_eq!(after1.next_run_at, Some(t0 + ChronoDuration::seconds(1)));

    // Not eligible until next_run_at.
    assert!(store.claim("w", t0).await.unwrap().is_none());

    let t1 = t0 + ChronoDuration::seconds(1);
    let claimed2 = store.claim("w", t1).await.unwrap().unwrap();
    assert_eq!(claimed2.attempts, 1);
    store
        .fail(&claimed2.id, 2, Some(2), 2, Some("boom again".into()), t1)
        .await
        .unwrap();
    let after2 = store.get("x").await.unwrap().unwrap();
    assert_eq!(after2.state, JobState::Dead);
    assert_eq!(after2.attempts, 2);

    assert!(store.claim("w", t1 + ChronoDuration::hours(1)).await.unwrap().is_none());
}

// Requeuing a dead-lettered job resets attempts and schedule.
#[tokio::test]
async fn dlq_requeue_resets_attempts_and_schedule() {
    let (store, _dir) = new_store().await;
    let new_job = NewJob::from_json(r#"{"id":"dead-job","command":"false","max_retries":0}"#).unwrap();
    store.insert_job(new_job).await.unwrap();

    let now = Utc::now();
    let claimed = store.claim("w", now).await.unwrap().unwrap();
    store
        .fail(&claimed.id, 1, Some(0), 2, Some("nope".into()), now)
        .await
        .unwrap();
    let dead = store.get("dead-job").await.unwrap().unwrap();
    assert_eq!(dead.state, JobState::Dead);

    let revived = store.move_dead_to_pending("dead-job").await.unwrap();
    assert_eq!(revived.state, JobState::Pending);
    assert_eq!(revived.attempts, 0);
    assert_eq!(revived.next_run_at, None);

    let reclaimed = store.claim("w2", Utc::now()).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, "dead-job");
}

#[tokio::test]
async fn requeue_refuses_non_dead_job() {
    let (store, _dir) = new_store().await;
    store.insert_job(job("alive", 0)).await.unwrap();

    let err = store.move_dead_to_pending("alive").await.unwrap_err();
    assert!(matches!(err, queuectl_core::QueueError::WrongState { .. }));
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let (store, _dir) = new_store().await;
    store.insert_job(job("dup", 0)).await.unwrap();
    let err = store.insert_job(job("dup", 0)).await.unwrap_err();
    assert!(matches!(err, queuectl_core::QueueError::Duplicate(_)));
}

#[tokio::test]
async fn counts_report_every_state_including_zero() {
    let (store, _dir) = new_store().await;
    store.insert_job(job("a", 0)).await.unwrap();
    let new_job = NewJob::from_json(r#"{"id":"dead-one","command":"false","max_retries":0}"#).unwrap();
    store.insert_job(new_job).await.unwrap();
    let claimed = store.claim("w", Utc::now()).await.unwrap().unwrap();
    store
        .fail(&claimed.id, 1, Some(0), 2, None, Utc::now())
        .await
        .unwrap();

    let counts = store.counts().await.unwrap();
    assert_eq!(counts[&JobState::Pending], 1);
    assert_eq!(counts[&JobState::Dead], 1);
    assert_eq!(counts[&JobState::Processing], 0);
    assert_eq!(counts[&JobState::Completed], 0);
    assert_eq!(counts[&JobState::Failed], 0);
}

#[tokio::test]
async fn config_set_then_get_round_trips() {
    let (store, _dir) = new_store().await;
    assert_eq!(
        store.get_config("job-timeout").await.unwrap().as_deref(),
        Some("10")
    );
    store.set_config("job-timeout", "30").await.unwrap();
    assert_eq!(
        store.get_config("job-timeout").await.unwrap().as_deref(),
        Some("30")
    );
}

// Exclusivity under concurrent claims: no two workers ever claim the same job.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_claims_never_double_claim() {
    let (store, _dir) = new_store().await;
    let store = Arc::new(store);

    for i in 0..20 {
        store.insert_job(job(&format!("job-{i}"), i as i64)).await.unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match store.claim(&format!("worker-{w}"), Utc::now()).await.unwrap() {
                    Some(job) => claimed.push(job.id),
                    None => break,
                }
            }
            claimed
        }));
    }

    let mut all_claimed = Vec::new();
    for handle in handles {
        all_claimed.extend(handle.await.unwrap());
    }

    all_claimed.sort();
    all_claimed.dedup();
    assert_eq!(all_claimed.len(), 20, "every job must be claimed exactly once");
}
