//! Batch job configuration.

use markly_core::defaults::{
    BATCH_DEFAULT_CONCURRENCY, BATCH_MAX_CONCURRENCY, BATCH_MIN_CONCURRENCY, EVENT_BUS_CAPACITY,
    TARGET_TAG_NAME,
};
use markly_core::StartBatchJobRequest;

/// Configuration for the batch job manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Catch-all tag whose bookmarks are enriched.
    pub target_tag_name: String,
    /// Concurrency used when the caller does not choose one.
    pub default_concurrency: i32,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            target_tag_name: TARGET_TAG_NAME.to_string(),
            default_concurrency: BATCH_DEFAULT_CONCURRENCY,
            event_capacity: EVENT_BUS_CAPACITY,
        }
    }
}

impl BatchConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `AI_BATCH_TARGET_TAG` | `Other` | Tag whose bookmarks are enriched |
    /// | `AI_BATCH_DEFAULT_CONCURRENCY` | `3` | Clamped to 1..=5 |
    /// | `AI_BATCH_EVENT_CAPACITY` | `256` | Lifecycle event buffer |
    pub fn from_env() -> Self {
        let target_tag_name = std::env::var("AI_BATCH_TARGET_TAG")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| TARGET_TAG_NAME.to_string());

        let default_concurrency = std::env::var("AI_BATCH_DEFAULT_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(BATCH_DEFAULT_CONCURRENCY)
            .clamp(BATCH_MIN_CONCURRENCY, BATCH_MAX_CONCURRENCY);

        let event_capacity = std::env::var("AI_BATCH_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(EVENT_BUS_CAPACITY)
            .max(1);

        Self {
            target_tag_name,
            default_concurrency,
            event_capacity,
        }
    }

    /// Set the target tag name.
    pub fn with_target_tag_name(mut self, name: impl Into<String>) -> Self {
        self.target_tag_name = name.into();
        self
    }

    /// Set the default concurrency, clamped to the allowed range.
    pub fn with_default_concurrency(mut self, concurrency: i32) -> Self {
        self.default_concurrency = concurrency.clamp(BATCH_MIN_CONCURRENCY, BATCH_MAX_CONCURRENCY);
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// A start request using the default concurrency.
    pub fn default_request(&self) -> StartBatchJobRequest {
        StartBatchJobRequest::new(self.default_concurrency)
    }
}
