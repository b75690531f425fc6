//! # queuectl-core
//!
//! Domain types shared by every other `queuectl` crate: the [`Job`] record
//! and its [`JobState`] machine, the [`Config`] key space, the pure
//! [`retry`] policy, the [`QueueError`] kind enum, and small helpers for
//! wall-clock time, worker identities and the on-disk layout under
//! `~/.queuectl`.
//!
//! This crate is policy-light and backend-free on purpose: it knows nothing
//! about SQLite, shells or HTTP. Everything here is pure data and pure
//! functions so it can be unit tested without any IO.

pub mod config;
pub mod error;
pub mod home;
pub mod job;
pub mod retry;

pub use config::Config;
pub use error::QueueError;
pub use job::{Job, JobState, NewJob};
pub use retry::{decide_retry, RetryDecision};

use chrono::{DateTime, Utc};

/// Current wall-clock instant, as used for `claim`, `fail` and timestamping.
///
/// Centralized so that a future orphan-recovery sweep or test harness has a
/// single seam to intercept; today it is a thin wrapper over [`Utc::now`].
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Builds the worker identity string used purely for attribution
/// (`locked_by`), never for exclusion.
pub fn worker_identity(pid: u32, index: usize) -> String {
    format!("worker-{pid}-{index}")
}
