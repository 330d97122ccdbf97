//! Fixed cadence and sizing constants for health sync jobs.

/// Outbox rows drained per push batch.
pub const OUTBOX_BATCH_SIZE: i64 = 50;

/// Transient failures tolerated before an entry is quarantined as `failed`.
pub const OUTBOX_MAX_RETRIES: i32 = 5;

/// Push cadence in seconds.
pub const HEALTH_PUSH_INTERVAL_SECS: u64 = 15 * 60;

/// Pull cadence in seconds.
pub const HEALTH_PULL_INTERVAL_SECS: u64 = 30 * 60;

/// Watchdog cadence in seconds.
pub const HEALTH_WATCHDOG_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Maximum jitter (seconds) added to periodic job intervals.
pub const HEALTH_SYNC_INTERVAL_JITTER_SECS: u64 = 30;

/// Timeout applied to every backend and health-source request.
pub const HEALTH_SYNC_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Unique job names registered with the scheduler.
pub const PUSH_JOB_NAME: &str = "health_outbox_push";
pub const PULL_JOB_NAME: &str = "health_changes_pull";
pub const WATCHDOG_JOB_NAME: &str = "health_sync_watchdog";
