//! The recognized `config`/`config set` key space and its defaults.
//!
//! Configuration is always read fresh from the store (see
//! `queuectl-store`'s `get_config`) — this module only knows the key names
//! and how to parse their values, never caches a value itself, so that
//! `config set` takes effect on the very next job a worker claims.

pub const DEFAULT_MAX_RETRIES_KEY: &str = "default-max-retries";
pub const BACKOFF_BASE_KEY: &str = "backoff-base";
pub const JOB_TIMEOUT_KEY: &str = "job-timeout";

/// All recognized keys, in the order `init` seeds them.
pub const KEYS: [&str; 3] = [DEFAULT_MAX_RETRIES_KEY, BACKOFF_BASE_KEY, JOB_TIMEOUT_KEY];

/// A resolved snapshot of the config table, typed and defaulted. Built by
/// the worker loop once per tick rather than cached across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub default_max_retries: i64,
    pub backoff_base: i64,
    pub job_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_max_retries: 3,
            backoff_base: 2,
            job_timeout_secs: 10,
        }
    }
}

/// The seed value a fresh `config` table should hold for `key`, or `None`
/// for an unrecognized key.
pub fn default_value(key: &str) -> Option<&'static str> {
    match key {
        DEFAULT_MAX_RETRIES_KEY => Some("3"),
        BACKOFF_BASE_KEY => Some("2"),
        JOB_TIMEOUT_KEY => Some("10"),
        _ => None,
    }
}

/// Parses a stored config value as an integer, falling back to `fallback`
/// both when the value is absent and when it fails to parse — matching the
/// original system's "default N on parse failure" behavior rather than
/// surfacing a parse error mid job.
pub fn parse_i64_or(value: Option<&str>, fallback: i64) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

pub fn parse_u64_or(value: Option<&str>, fallback: u64) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(fallback)
}
