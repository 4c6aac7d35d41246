//! Domain models for batch enrichment jobs, bookmarks and tags.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::{
    BATCH_MAX_CONCURRENCY, BATCH_MIN_CONCURRENCY, LAST_ERROR_MAX_LEN, TRUNCATION_MARKER,
    UNKNOWN_ERROR,
};
use crate::{Error, Result};

/// Owner of jobs, tags and bookmarks.
pub type UserId = String;

/// Identifier of a persisted batch job.
pub type JobId = i64;

/// Identifier of a bookmark row.
pub type BookmarkId = i64;

/// Identifier of a user tag row.
pub type TagId = i64;

// =============================================================================
// JOB STATUS
// =============================================================================

/// Status of a batch enrichment job.
///
/// `Running` and `Pausing` are active; the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchJobStatus {
    Running,
    Pausing,
    Paused,
    Completed,
    Failed,
}

impl BatchJobStatus {
    /// Database/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a runner is expected to be attached to the job.
    pub fn is_active(self) -> bool {
        match self {
            Self::Running | Self::Pausing => true,
            Self::Paused | Self::Completed | Self::Failed => false,
        }
    }

    /// Whether the job reached the end of its life.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchJobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "pausing" => Ok(Self::Pausing),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown batch job status: {other}"
            ))),
        }
    }
}

// =============================================================================
// JOB
// =============================================================================

/// Snapshot of a persisted batch enrichment job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: JobId,
    pub user_id: UserId,
    pub status: BatchJobStatus,
    pub target_tag_name: String,
    pub concurrency: i32,
    pub total_count: i32,
    pub processed_count: i32,
    pub success_count: i32,
    pub failed_count: i32,
    pub pause_requested: bool,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for inserting a new job row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBatchJob {
    pub user_id: UserId,
    pub status: BatchJobStatus,
    pub target_tag_name: String,
    pub concurrency: i32,
    pub total_count: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NewBatchJob {
    /// A job that will be handed to a runner.
    pub fn running(
        user_id: impl Into<UserId>,
        target_tag_name: impl Into<String>,
        concurrency: i32,
        total_count: i32,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            status: BatchJobStatus::Running,
            target_tag_name: target_tag_name.into(),
            concurrency,
            total_count,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// A job with nothing to process, finished at the moment it starts.
    pub fn empty(
        user_id: impl Into<UserId>,
        target_tag_name: impl Into<String>,
        concurrency: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            status: BatchJobStatus::Completed,
            target_tag_name: target_tag_name.into(),
            concurrency,
            total_count: 0,
            started_at: now,
            finished_at: Some(now),
        }
    }
}

/// Result of processing one worklist item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Failure(String),
}

impl ItemOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure(message) => Some(message),
        }
    }
}

/// Normalize an error message for storage in `last_error`.
///
/// Blank messages become [`UNKNOWN_ERROR`]. Messages longer than
/// [`LAST_ERROR_MAX_LEN`] characters are cut so that the result, including the
/// trailing `...`, is exactly that long.
pub fn normalize_error_message(message: &str) -> String {
    let text = message.trim();
    if text.is_empty() {
        return UNKNOWN_ERROR.to_string();
    }
    if text.chars().count() <= LAST_ERROR_MAX_LEN {
        return text.to_string();
    }
    let keep = LAST_ERROR_MAX_LEN - TRUNCATION_MARKER.len();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Input for starting a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartBatchJobRequest {
    pub concurrency: i32,
}

impl StartBatchJobRequest {
    pub fn new(concurrency: i32) -> Self {
        Self { concurrency }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency < BATCH_MIN_CONCURRENCY {
            return Err(Error::InvalidInput(format!(
                "concurrency must be at least {BATCH_MIN_CONCURRENCY}"
            )));
        }
        if self.concurrency > BATCH_MAX_CONCURRENCY {
            return Err(Error::InvalidInput(format!(
                "concurrency must be at most {BATCH_MAX_CONCURRENCY}"
            )));
        }
        Ok(())
    }
}

/// Input for pausing a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseBatchJobRequest {
    pub job_id: JobId,
}

impl PauseBatchJobRequest {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }

    pub fn validate(&self) -> Result<()> {
        if self.job_id <= 0 {
            return Err(Error::InvalidInput(
                "job_id must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// BOOKMARKS & TAGS
// =============================================================================

/// Minimal bookmark projection consumed by the batch runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTarget {
    pub id: BookmarkId,
    pub url: String,
}

/// A tag owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTag {
    pub id: TagId,
    pub user_id: UserId,
    pub name: String,
}

/// Metadata rewrite applied to a bookmark after analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkEnrichment {
    pub id: BookmarkId,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub related_tag_ids: Vec<TagId>,
}

/// Structured output of the website analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteAnalysis {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub favicon: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_all_variants() {
        for status in [
            BatchJobStatus::Running,
            BatchJobStatus::Pausing,
            BatchJobStatus::Paused,
            BatchJobStatus::Completed,
            BatchJobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<BatchJobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        let err = "unknown".parse::<BatchJobStatus>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_status_active_and_terminal() {
        assert!(BatchJobStatus::Running.is_active());
        assert!(BatchJobStatus::Pausing.is_active());
        assert!(BatchJobStatus::Paused.is_terminal());
        assert!(BatchJobStatus::Completed.is_terminal());
        assert!(BatchJobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&BatchJobStatus::Pausing).unwrap();
        assert_eq!(json, "\"pausing\"");
    }

    #[test]
    fn test_normalize_keeps_short_messages() {
        assert_eq!(normalize_error_message("plain failure"), "plain failure");
    }

    #[test]
    fn test_normalize_keeps_message_at_limit() {
        let input = "b".repeat(500);
        assert_eq!(normalize_error_message(&input), input);
    }

    #[test]
    fn test_normalize_truncates_long_messages() {
        let input = "a".repeat(1000);
        let output = normalize_error_message(&input);
        assert_eq!(output.chars().count(), 500);
        assert!(output.ends_with("..."));
    }

    #[test]
    fn test_normalize_counts_characters_not_bytes() {
        let input = "错".repeat(600);
        let output = normalize_error_message(&input);
        assert_eq!(output.chars().count(), 500);
        assert!(output.starts_with("错错"));
    }

    #[test]
    fn test_normalize_blank_message() {
        assert_eq!(normalize_error_message("   "), UNKNOWN_ERROR);
    }

    #[test]
    fn test_start_request_validation() {
        assert!(StartBatchJobRequest::new(3).validate().is_ok());
        assert!(StartBatchJobRequest::new(1).validate().is_ok());
        assert!(StartBatchJobRequest::new(5).validate().is_ok());
        assert!(StartBatchJobRequest::new(0).validate().is_err());
        assert!(StartBatchJobRequest::new(6).validate().is_err());
    }

    #[test]
    fn test_pause_request_validation() {
        assert!(PauseBatchJobRequest::new(1).validate().is_ok());
        assert!(PauseBatchJobRequest::new(0).validate().is_err());
        assert!(PauseBatchJobRequest::new(-4).validate().is_err());
    }

    #[test]
    fn test_empty_job_starts_and_finishes_together() {
        let job = NewBatchJob::empty("u1", "Other", 2);
        assert_eq!(job.status, BatchJobStatus::Completed);
        assert_eq!(job.total_count, 0);
        assert_eq!(job.finished_at, Some(job.started_at));
    }

    #[test]
    fn test_item_outcome_accessors() {
        assert!(ItemOutcome::Success.is_ok());
        assert_eq!(ItemOutcome::Success.message(), None);
        let failure = ItemOutcome::Failure("boom".to_string());
        assert!(!failure.is_ok());
        assert_eq!(failure.message(), Some("boom"));
    }

    #[test]
    fn test_analysis_deserializes_with_missing_fields() {
        let analysis: WebsiteAnalysis =
            serde_json::from_str(r#"{"title":"Rust","tags":["lang"]}"#).unwrap();
        assert_eq!(analysis.title, "Rust");
        assert!(analysis.description.is_empty());
        assert_eq!(analysis.tags, vec!["lang".to_string()]);
    }
}
