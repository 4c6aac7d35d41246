//! Store and analyzer abstractions consumed by the batch engine.

use async_trait::async_trait;

use crate::{
    BatchJob, BatchTarget, BookmarkEnrichment, ItemOutcome, JobId, NewBatchJob, Result, TagId,
    UserTag, WebsiteAnalysis,
};

// =============================================================================
// JOB STORE
// =============================================================================

/// Persistent store for batch enrichment jobs.
///
/// Counter updates and state transitions must be atomic at the storage
/// layer: several runner workers write to the same row concurrently.
#[async_trait]
pub trait BatchJobRepository: Send + Sync {
    /// Insert a new job.
    ///
    /// Returns `None` when the user already has an active (`running` or
    /// `pausing`) job and the insert was skipped.
    async fn insert(&self, job: NewBatchJob) -> Result<Option<BatchJob>>;

    /// Get a job by ID.
    async fn get(&self, job_id: JobId) -> Result<Option<BatchJob>>;

    /// Get a job by ID, only if it belongs to `user_id`.
    async fn get_for_user(&self, job_id: JobId, user_id: &str) -> Result<Option<BatchJob>>;

    /// Most recently created job of a user.
    async fn latest_for_user(&self, user_id: &str) -> Result<Option<BatchJob>>;

    /// Jobs of a user, most recent first.
    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<BatchJob>>;

    /// Atomically count one processed item.
    async fn record_outcome(&self, job_id: JobId, outcome: &ItemOutcome) -> Result<()>;

    /// Flag an active job for pausing.
    ///
    /// Returns `None` if the job does not exist, is not owned by `user_id`,
    /// or is no longer active.
    async fn request_pause(&self, job_id: JobId, user_id: &str) -> Result<Option<BatchJob>>;

    /// Move an active job to `paused` or `completed`.
    ///
    /// Returns `None` (and changes nothing) when the job is already terminal.
    async fn finalize(&self, job_id: JobId) -> Result<Option<BatchJob>>;

    /// Force a job to `failed`, whatever its current status.
    async fn mark_failed(&self, job_id: JobId, message: &str) -> Result<()>;

    /// Move a job to `failed` only if it is still active.
    async fn mark_interrupted(&self, job_id: JobId, message: &str) -> Result<Option<BatchJob>>;
}

// =============================================================================
// TAG & BOOKMARK STORES
// =============================================================================

/// Access to a user's tags.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// All tags of a user.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserTag>>;

    /// A user's tag with exactly this name.
    async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<UserTag>>;

    /// Create the named tags that do not exist yet and return all of them.
    ///
    /// Must not fail when a concurrent caller creates the same name.
    async fn create_if_missing(&self, user_id: &str, names: &[String]) -> Result<Vec<UserTag>>;
}

/// Access to a user's bookmarks.
#[async_trait]
pub trait BookmarkRepository: Send + Sync {
    /// Bookmarks of a user linked to a tag, ordered by id.
    async fn list_by_tag(
        &self,
        user_id: &str,
        tag_id: TagId,
        exclude_fetch_failed: bool,
    ) -> Result<Vec<BatchTarget>>;

    /// Rewrite a bookmark's metadata and related tags.
    ///
    /// Tag ids not owned by `user_id` are ignored.
    async fn update_enrichment(&self, user_id: &str, update: &BookmarkEnrichment) -> Result<()>;
}

// =============================================================================
// ANALYZER
// =============================================================================

/// External AI website analyzer.
#[async_trait]
pub trait WebsiteAnalyzer: Send + Sync {
    /// Analyze a page, suggesting tags with the user's known tag names as a hint.
    async fn analyze(
        &self,
        url: &str,
        known_tags: &[String],
        user_id: &str,
    ) -> Result<WebsiteAnalysis>;
}
