//! In-memory stores and a scriptable analyzer for deterministic testing.
//!
//! [`MemoryStore`] implements every store trait over one mutex-guarded state,
//! so counter updates and transitions are atomic the same way the PostgreSQL
//! statements are. [`MockAnalyzer`] returns canned analyses, can fail on
//! chosen URLs, and records call counts and peak concurrency.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use markly_core::mock::{MemoryStore, MockAnalyzer};
//!
//! let store = MemoryStore::new();
//! let other = store.add_tag("u1", "Other");
//! store.add_bookmark("u1", "https://example.com", &[other.id], false);
//!
//! let analyzer = MockAnalyzer::new()
//!     .with_tags(vec!["Rust".into()])
//!     .with_failing_url("https://broken.example");
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    BatchJob, BatchJobRepository, BatchJobStatus, BatchTarget, BookmarkEnrichment,
    BookmarkId, BookmarkRepository, Error, ItemOutcome, JobId, NewBatchJob, Result, TagId,
    TagRepository, UserTag, WebsiteAnalysis, WebsiteAnalyzer,
};

// =============================================================================
// MEMORY STORE
// =============================================================================

/// A bookmark row held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBookmark {
    pub id: BookmarkId,
    pub user_id: String,
    pub url: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub tag_ids: Vec<TagId>,
    pub fetch_failed: bool,
}

#[derive(Default)]
struct State {
    jobs: Vec<BatchJob>,
    tags: Vec<UserTag>,
    bookmarks: Vec<StoredBookmark>,
    next_job_id: JobId,
    next_tag_id: TagId,
    next_bookmark_id: BookmarkId,
    fail_outcome_writes: bool,
    outcome_writes: usize,
}

/// In-memory implementation of the job, tag and bookmark stores.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a tag for a user.
    pub fn add_tag(&self, user_id: &str, name: &str) -> UserTag {
        let mut state = self.lock();
        state.next_tag_id += 1;
        let tag = UserTag {
            id: state.next_tag_id,
            user_id: user_id.to_string(),
            name: name.to_string(),
        };
        state.tags.push(tag.clone());
        tag
    }

    /// Create a bookmark linked to `tag_ids`.
    pub fn add_bookmark(
        &self,
        user_id: &str,
        url: &str,
        tag_ids: &[TagId],
        fetch_failed: bool,
    ) -> BookmarkId {
        let mut state = self.lock();
        state.next_bookmark_id += 1;
        let id = state.next_bookmark_id;
        state.bookmarks.push(StoredBookmark {
            id,
            user_id: user_id.to_string(),
            url: url.to_string(),
            name: url.to_string(),
            icon: String::new(),
            description: String::new(),
            tag_ids: tag_ids.to_vec(),
            fetch_failed,
        });
        id
    }

    /// Insert a job row as-is, bypassing the active-job guard.
    ///
    /// Used to simulate rows left behind by a previous process.
    pub fn seed_job(&self, mut job: BatchJob) -> BatchJob {
        let mut state = self.lock();
        state.next_job_id += 1;
        job.id = state.next_job_id;
        state.jobs.push(job.clone());
        job
    }

    pub fn bookmark(&self, id: BookmarkId) -> Option<StoredBookmark> {
        self.lock().bookmarks.iter().find(|b| b.id == id).cloned()
    }

    pub fn tags_of(&self, user_id: &str) -> Vec<UserTag> {
        self.lock()
            .tags
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn job_count(&self, user_id: &str) -> usize {
        self.lock()
            .jobs
            .iter()
            .filter(|j| j.user_id == user_id)
            .count()
    }

    /// Make every subsequent `record_outcome` fail, simulating a store outage.
    pub fn fail_outcome_writes(&self, fail: bool) {
        self.lock().fail_outcome_writes = fail;
    }

    /// Number of `record_outcome` calls that succeeded.
    pub fn outcome_writes(&self) -> usize {
        self.lock().outcome_writes
    }
}

fn job_mut(state: &mut State, job_id: JobId) -> Option<&mut BatchJob> {
    state.jobs.iter_mut().find(|j| j.id == job_id)
}

#[async_trait]
impl BatchJobRepository for MemoryStore {
    async fn insert(&self, job: NewBatchJob) -> Result<Option<BatchJob>> {
        let mut state = self.lock();
        let has_active = state
            .jobs
            .iter()
            .any(|j| j.user_id == job.user_id && j.status.is_active());
        if has_active && job.status.is_active() {
            return Ok(None);
        }
        state.next_job_id += 1;
        let now = Utc::now();
        let row = BatchJob {
            id: state.next_job_id,
            user_id: job.user_id,
            status: job.status,
            target_tag_name: job.target_tag_name,
            concurrency: job.concurrency,
            total_count: job.total_count,
            processed_count: 0,
            success_count: 0,
            failed_count: 0,
            pause_requested: false,
            last_error: None,
            started_at: Some(job.started_at),
            finished_at: job.finished_at,
            created_at: now,
            updated_at: now,
        };
        state.jobs.push(row.clone());
        Ok(Some(row))
    }

    async fn get(&self, job_id: JobId) -> Result<Option<BatchJob>> {
        Ok(self.lock().jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn get_for_user(&self, job_id: JobId, user_id: &str) -> Result<Option<BatchJob>> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .find(|j| j.id == job_id && j.user_id == user_id)
            .cloned())
    }

    async fn latest_for_user(&self, user_id: &str) -> Result<Option<BatchJob>> {
        let jobs = BatchJobRepository::list_for_user(self, user_id, 1).await?;
        Ok(jobs.into_iter().next())
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<BatchJob>> {
        let mut jobs: Vec<BatchJob> = self
            .lock()
            .jobs
            .iter()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn record_outcome(&self, job_id: JobId, outcome: &ItemOutcome) -> Result<()> {
        let mut state = self.lock();
        if state.fail_outcome_writes {
            return Err(Error::Internal("job store unavailable".to_string()));
        }
        state.outcome_writes += 1;
        let Some(job) = job_mut(&mut state, job_id) else {
            return Ok(());
        };
        if job.processed_count >= job.total_count {
            return Ok(());
        }
        job.processed_count += 1;
        match outcome {
            ItemOutcome::Success => job.success_count += 1,
            ItemOutcome::Failure(message) => {
                job.failed_count += 1;
                job.last_error = Some(crate::normalize_error_message(message));
            }
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn request_pause(&self, job_id: JobId, user_id: &str) -> Result<Option<BatchJob>> {
        let mut state = self.lock();
        let Some(job) = job_mut(&mut state, job_id) else {
            return Ok(None);
        };
        if job.user_id != user_id || !job.status.is_active() {
            return Ok(None);
        }
        job.pause_requested = true;
        job.status = BatchJobStatus::Pausing;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn finalize(&self, job_id: JobId) -> Result<Option<BatchJob>> {
        let mut state = self.lock();
        let Some(job) = job_mut(&mut state, job_id) else {
            return Ok(None);
        };
        if !job.status.is_active() {
            return Ok(None);
        }
        job.status = if job.pause_requested || job.status == BatchJobStatus::Pausing {
            BatchJobStatus::Paused
        } else {
            BatchJobStatus::Completed
        };
        let now = Utc::now();
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_failed(&self, job_id: JobId, message: &str) -> Result<()> {
        let mut state = self.lock();
        let job = job_mut(&mut state, job_id)
            .ok_or_else(|| Error::NotFound(format!("batch job {job_id}")))?;
        let now = Utc::now();
        job.status = BatchJobStatus::Failed;
        job.last_error = Some(crate::normalize_error_message(message));
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(())
    }

    async fn mark_interrupted(&self, job_id: JobId, message: &str) -> Result<Option<BatchJob>> {
        let mut state = self.lock();
        let Some(job) = job_mut(&mut state, job_id) else {
            return Ok(None);
        };
        if !job.status.is_active() {
            return Ok(None);
        }
        let now = Utc::now();
        job.status = BatchJobStatus::Failed;
        job.last_error = Some(crate::normalize_error_message(message));
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }
}

#[async_trait]
impl TagRepository for MemoryStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserTag>> {
        Ok(self.tags_of(user_id))
    }

    async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<UserTag>> {
        Ok(self
            .lock()
            .tags
            .iter()
            .find(|t| t.user_id == user_id && t.name == name)
            .cloned())
    }

    async fn create_if_missing(&self, user_id: &str, names: &[String]) -> Result<Vec<UserTag>> {
        let mut state = self.lock();
        let mut result = Vec::with_capacity(names.len());
        for name in names {
            let existing = state
                .tags
                .iter()
                .find(|t| t.user_id == user_id && &t.name == name)
                .cloned();
            let tag = match existing {
                Some(tag) => tag,
                None => {
                    state.next_tag_id += 1;
                    let tag = UserTag {
                        id: state.next_tag_id,
                        user_id: user_id.to_string(),
                        name: name.clone(),
                    };
                    state.tags.push(tag.clone());
                    tag
                }
            };
            result.push(tag);
        }
        Ok(result)
    }
}

#[async_trait]
impl BookmarkRepository for MemoryStore {
    async fn list_by_tag(
        &self,
        user_id: &str,
        tag_id: TagId,
        exclude_fetch_failed: bool,
    ) -> Result<Vec<BatchTarget>> {
        let state = self.lock();
        let mut targets: Vec<BatchTarget> = state
            .bookmarks
            .iter()
            .filter(|b| b.user_id == user_id && b.tag_ids.contains(&tag_id))
            .filter(|b| !(exclude_fetch_failed && b.fetch_failed))
            .map(|b| BatchTarget {
                id: b.id,
                url: b.url.clone(),
            })
            .collect();
        targets.sort_by_key(|t| t.id);
        Ok(targets)
    }

    async fn update_enrichment(&self, user_id: &str, update: &BookmarkEnrichment) -> Result<()> {
        let mut state = self.lock();
        let owned: HashSet<TagId> = state
            .tags
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.id)
            .collect();
        let bookmark = state
            .bookmarks
            .iter_mut()
            .find(|b| b.id == update.id && b.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("bookmark {}", update.id)))?;
        bookmark.name = update.name.clone();
        bookmark.icon = update.icon.clone();
        bookmark.description = update.description.clone();
        let mut tag_ids = Vec::new();
        for id in &update.related_tag_ids {
            if owned.contains(id) && !tag_ids.contains(id) {
                tag_ids.push(*id);
            }
        }
        bookmark.tag_ids = tag_ids;
        Ok(())
    }
}

// =============================================================================
// MOCK ANALYZER
// =============================================================================

#[derive(Debug, Clone, Default)]
struct MockConfig {
    tags: Vec<String>,
    responses: HashMap<String, WebsiteAnalysis>,
    failing_urls: HashSet<String>,
    panicking_urls: HashSet<String>,
    latency_ms: u64,
}

/// Scriptable [`WebsiteAnalyzer`] for tests.
#[derive(Clone, Default)]
pub struct MockAnalyzer {
    config: Arc<MockConfig>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags suggested for every URL without an explicit response.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        Arc::make_mut(&mut self.config).tags = tags;
        self
    }

    /// Fixed analysis for one URL.
    pub fn with_response(mut self, url: impl Into<String>, analysis: WebsiteAnalysis) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .insert(url.into(), analysis);
        self
    }

    /// Fail every analysis of `url`.
    pub fn with_failing_url(mut self, url: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .failing_urls
            .insert(url.into());
        self
    }

    /// Panic while analyzing `url`.
    pub fn with_panicking_url(mut self, url: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .panicking_urls
            .insert(url.into());
        self
    }

    /// Simulated latency per call.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous `analyze` calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WebsiteAnalyzer for MockAnalyzer {
    async fn analyze(
        &self,
        url: &str,
        _known_tags: &[String],
        _user_id: &str,
    ) -> Result<WebsiteAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        if self.config.panicking_urls.contains(url) {
            panic!("analyzer crashed on {url}");
        }
        if self.config.failing_urls.contains(url) {
            return Err(Error::Inference(format!("failed to fetch {url}")));
        }
        if let Some(analysis) = self.config.responses.get(url) {
            return Ok(analysis.clone());
        }
        Ok(WebsiteAnalysis {
            title: format!("Title of {url}"),
            description: format!("Description of {url}"),
            favicon: format!("{url}/favicon.ico"),
            tags: self.config.tags.clone(),
        })
    }
}
