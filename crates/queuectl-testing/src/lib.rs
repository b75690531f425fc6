//! # queuectl-testing
//!
//! Shared fixtures for `queuectl`'s test suites: an isolated, already
//! initialized [`SqliteStore`] rooted in a fresh [`TempDir`], and small
//! builders for enqueue documents. Mirrors the shape of a teacher crate
//! whose test helpers outlive any one crate's own test module.

use queuectl_core::NewJob;
use queuectl_store::SqliteStore;
use tempfile::TempDir;

/// A freshly initialized store backed by a SQLite file under a temp
/// directory. The `TempDir` must be kept alive for as long as the store is
/// used — it is returned alongside so the caller controls its lifetime.
pub async fn temp_store() -> (SqliteStore, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let store = SqliteStore::connect(&dir.path().join("queue.db"))
        .await
        .expect("open sqlite store");
    store.init().await.expect("init schema");
    (store, dir)
}

/// Builds a minimal enqueue document for `id` running `command`, with no
/// optional fields set.
pub fn new_job(id: &str, command: &str) -> NewJob {
    NewJob::from_json(&format!(r#"{{"id":"{id}","command":"{command}"}}"#))
        .expect("build fixture job")
}

/// Builds an enqueue document with an explicit priority, otherwise minimal.
pub fn new_job_with_priority(id: &str, command: &str, priority: i64) -> NewJob {
    NewJob::from_json(&format!(
        r#"{{"id":"{id}","command":"{command}","priority":{priority}}}"#
    ))
    .expect("build fixture job")
}
