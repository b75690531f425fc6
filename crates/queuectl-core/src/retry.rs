use chrono::{DateTime, Utc};

/// The outcome of applying the retry policy to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempts are exhausted; the job moves to the dead-letter queue.
    Dead,
    /// The job stays `failed` and becomes eligible again at `next_run_at`.
    Retry { next_run_at: DateTime<Utc> },
}

/// Pure retry/backoff function: given the attempt count *after* the run
/// that just failed, the configured ceiling and base, and the current
/// instant, decides whether the job dies or gets a `next_run_at`.
///
/// `attempts_after_this_run` counts from 1 (the first failure). The delay
/// before retry `k` is `backoff_base^(k-1)` seconds, so the first retry
/// waits `backoff_base^0 = 1` second. With `max_retries = 0` the very first
/// failure already satisfies `attempts_after_this_run >= max_retries`, so
/// the job dies without ever retrying — this is intentional, not an
/// off-by-one.
pub fn decide_retry(
    attempts_after_this_run: i64,
    max_retries: i64,
    backoff_base: i64,
    now: DateTime<Utc>,
) -> RetryDecision {
    if attempts_after_this_run >= max_retries {
        return RetryDecision::Dead;
    }
    let exponent = (attempts_after_this_run - 1).max(0) as u32;
    let delay_secs = backoff_base.saturating_pow(exponent);
    RetryDecision::Retry {
        next_run_at: now + chrono::Duration::seconds(delay_secs),
    }
}
