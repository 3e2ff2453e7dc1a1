//! Polling configuration.
//!
//! The host offers no subscription for change request activity in this
//! deployment, so the snapshot differ runs on a fixed interval.
//!
//! - **Poll interval**: 60 seconds by default (configurable via
//!   `MERGE_WARDEN_POLL_INTERVAL_SECS`)
//! - **Task concurrency**: due tasks run as independent tokio tasks, at most
//!   `max_concurrent_tasks` at a time

use std::time::Duration;

/// Default interval between reconciliation ticks (1 minute).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Lower bound so a misconfigured interval cannot hammer the host API.
const MIN_POLL_INTERVAL_SECS: u64 = 5;

/// Default number of queued tasks allowed to run at once.
const DEFAULT_MAX_CONCURRENT_TASKS: usize = 8;

pub const POLL_INTERVAL_ENV: &str = "MERGE_WARDEN_POLL_INTERVAL_SECS";

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Interval between reconciliation ticks.
    ///
    /// Default: 1 minute. Configure via `MERGE_WARDEN_POLL_INTERVAL_SECS`.
    pub poll_interval: Duration,

    /// Maximum number of queued tasks running concurrently.
    pub max_concurrent_tasks: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    pub fn new() -> Self {
        PollConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }

    /// Reads `MERGE_WARDEN_POLL_INTERVAL_SECS`; other values use defaults.
    pub fn from_env() -> Self {
        Self::from_interval_var(std::env::var(POLL_INTERVAL_ENV).ok().as_deref())
    }

    fn from_interval_var(value: Option<&str>) -> Self {
        let secs = value
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .max(MIN_POLL_INTERVAL_SECS);

        PollConfig {
            poll_interval: Duration::from_secs(secs),
            ..Self::new()
        }
    }
}
