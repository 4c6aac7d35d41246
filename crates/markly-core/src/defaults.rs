//! Centralized default constants for the batch-enrichment engine.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// BATCH JOBS
// =============================================================================

/// Catch-all tag whose members are eligible for batch enrichment.
pub const TARGET_TAG_NAME: &str = "Other";

/// Lowest accepted worker count for a batch job.
pub const BATCH_MIN_CONCURRENCY: i32 = 1;

/// Highest accepted worker count for a batch job.
pub const BATCH_MAX_CONCURRENCY: i32 = 5;

/// Worker count used when a caller does not pick one.
pub const BATCH_DEFAULT_CONCURRENCY: i32 = 3;

/// Maximum stored length (in characters) of `last_error`.
pub const LAST_ERROR_MAX_LEN: usize = 500;

/// Marker appended to a truncated error message.
pub const TRUNCATION_MARKER: &str = "...";

/// Message recorded when an error carries no text.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Message recorded when a job is found active without a live runner.
pub const INTERRUPTED_MESSAGE: &str =
    "background runner was interrupted, likely a process restart; please restart the task";

/// Message returned when pausing a job that already reached a terminal state.
pub const ALREADY_FINISHED_MESSAGE: &str = "job already finished, cannot pause";

// =============================================================================
// HISTORY & EVENTS
// =============================================================================

/// Default number of jobs returned by a history listing.
pub const HISTORY_LIMIT: i64 = 20;

/// Upper bound on a history listing.
pub const HISTORY_LIMIT_MAX: i64 = 100;

/// Capacity of the lifecycle event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// ANALYZER
// =============================================================================

/// Default base URL of the website analyzer service.
pub const ANALYZER_URL: &str = "http://localhost:8787";

/// Timeout for one analyzer request in seconds.
pub const ANALYZER_TIMEOUT_SECS: u64 = 60;
