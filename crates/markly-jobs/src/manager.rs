//! Batch job lifecycle: start, pause, progress, finalization and recovery.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use markly_core::defaults::{
    ALREADY_FINISHED_MESSAGE, HISTORY_LIMIT, HISTORY_LIMIT_MAX, INTERRUPTED_MESSAGE,
};
use markly_core::{
    normalize_error_message, BatchJob, BatchJobRepository, BatchJobStatus, BatchTarget,
    BookmarkRepository, Error, ItemOutcome, JobId, NewBatchJob, PauseBatchJobRequest, Result,
    StartBatchJobRequest, TagRepository, WebsiteAnalyzer,
};
use markly_db::Database;

use crate::config::BatchConfig;
use crate::enrich::{enrich_bookmark, EnrichContext};
use crate::events::BatchJobEvent;
use crate::registry::JobRegistry;
use crate::runner::{panic_message, run_batch, BatchRunSummary};

/// Owns batch jobs from creation to their terminal state.
///
/// Cloning is cheap; clones share stores, registry and event channel.
#[derive(Clone)]
pub struct BatchJobManager {
    jobs: Arc<dyn BatchJobRepository>,
    tags: Arc<dyn TagRepository>,
    bookmarks: Arc<dyn BookmarkRepository>,
    analyzer: Arc<dyn WebsiteAnalyzer>,
    registry: JobRegistry,
    config: BatchConfig,
    event_tx: broadcast::Sender<BatchJobEvent>,
}

impl BatchJobManager {
    /// Create a manager over explicit stores.
    pub fn new(
        jobs: Arc<dyn BatchJobRepository>,
        tags: Arc<dyn TagRepository>,
        bookmarks: Arc<dyn BookmarkRepository>,
        analyzer: Arc<dyn WebsiteAnalyzer>,
        registry: JobRegistry,
        config: BatchConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            jobs,
            tags,
            bookmarks,
            analyzer,
            registry,
            config,
            event_tx,
        }
    }

    /// Create a manager backed by the PostgreSQL repositories.
    pub fn from_database(
        db: &Database,
        analyzer: Arc<dyn WebsiteAnalyzer>,
        registry: JobRegistry,
        config: BatchConfig,
    ) -> Self {
        Self::new(
            Arc::new(db.jobs.clone()),
            Arc::new(db.tags.clone()),
            Arc::new(db.bookmarks.clone()),
            analyzer,
            registry,
            config,
        )
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchJobEvent> {
        self.event_tx.subscribe()
    }

    /// Abort every runner of this process; see [`JobRegistry::abort_all`].
    pub fn shutdown(&self) -> usize {
        self.registry.abort_all()
    }

    fn emit(&self, event: BatchJobEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Start enriching the user's catch-all bookmarks.
    ///
    /// Returns the user's active job unchanged if there is one. Otherwise a
    /// job is created and, when it has targets, a runner is spawned; the
    /// snapshot is returned without waiting for the run.
    pub async fn start(&self, user_id: &str, request: StartBatchJobRequest) -> Result<BatchJob> {
        request.validate()?;

        if let Some(active) = self.latest(user_id).await?.filter(|j| j.status.is_active()) {
            debug!(
                subsystem = "jobs",
                component = "batch_manager",
                op = "start",
                job_id = active.id,
                user_id,
                "Active batch job exists, returning it"
            );
            return Ok(active);
        }

        let starting = self.registry.begin_start(user_id);
        let targets = self.resolve_targets(user_id).await?;
        let total = i32::try_from(targets.len()).map_err(|_| {
            Error::InvalidInput(format!("too many bookmarks to enrich: {}", targets.len()))
        })?;
        let target_tag = &self.config.target_tag_name;
        let new_job = if targets.is_empty() {
            NewBatchJob::empty(user_id, target_tag, request.concurrency)
        } else {
            NewBatchJob::running(user_id, target_tag, request.concurrency, total)
        };

        let Some(job) = self.jobs.insert(new_job).await? else {
            debug!(
                subsystem = "jobs",
                component = "batch_manager",
                op = "start",
                user_id,
                "Concurrent start created the active job"
            );
            // Stop counting as mid-start so an orphaned winner can be healed.
            drop(starting);
            let active = self.jobs.latest_for_user(user_id).await?.ok_or_else(|| {
                Error::Internal(format!("active batch job of {user_id} vanished during start"))
            })?;
            return self.refresh_stale(active).await;
        };

        if job.status.is_terminal() {
            info!(
                subsystem = "jobs",
                component = "batch_manager",
                op = "start",
                job_id = job.id,
                user_id,
                "No bookmarks to enrich, job completed immediately"
            );
            return Ok(job);
        }

        info!(
            subsystem = "jobs",
            component = "batch_manager",
            op = "start",
            job_id = job.id,
            user_id,
            total,
            concurrency = job.concurrency,
            "Batch job started"
        );
        self.emit(BatchJobEvent::JobStarted {
            job_id: job.id,
            user_id: job.user_id.clone(),
            total,
        });
        self.spawn_runner(job.clone(), targets);
        Ok(job)
    }

    /// Request a cooperative pause of a running job.
    pub async fn pause(&self, user_id: &str, request: PauseBatchJobRequest) -> Result<BatchJob> {
        request.validate()?;

        let job = self
            .jobs
            .get_for_user(request.job_id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("batch job {}", request.job_id)))?;
        let job = self.refresh_stale(job).await?;

        match job.status {
            BatchJobStatus::Completed | BatchJobStatus::Failed | BatchJobStatus::Paused => {
                Err(Error::Job(ALREADY_FINISHED_MESSAGE.to_string()))
            }
            BatchJobStatus::Pausing => {
                debug!(
                    subsystem = "jobs",
                    component = "batch_manager",
                    op = "pause",
                    job_id = job.id,
                    "Pause already requested"
                );
                Ok(job)
            }
            BatchJobStatus::Running => match self.jobs.request_pause(job.id, user_id).await? {
                Some(pausing) => {
                    info!(
                        subsystem = "jobs",
                        component = "batch_manager",
                        op = "pause",
                        job_id = pausing.id,
                        user_id,
                        processed = pausing.processed_count,
                        total = pausing.total_count,
                        "Batch job pause requested"
                    );
                    Ok(pausing)
                }
                // Finished between the read and the update.
                None => Err(Error::Job(ALREADY_FINISHED_MESSAGE.to_string())),
            },
        }
    }

    /// The user's most recent job.
    pub async fn latest(&self, user_id: &str) -> Result<Option<BatchJob>> {
        match self.jobs.latest_for_user(user_id).await? {
            Some(job) => Ok(Some(self.refresh_stale(job).await?)),
            None => Ok(None),
        }
    }

    /// One of the user's jobs.
    pub async fn get(&self, user_id: &str, job_id: JobId) -> Result<Option<BatchJob>> {
        match self.jobs.get_for_user(job_id, user_id).await? {
            Some(job) => Ok(Some(self.refresh_stale(job).await?)),
            None => Ok(None),
        }
    }

    /// The user's jobs, most recent first.
    pub async fn history(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<BatchJob>> {
        let limit = limit.unwrap_or(HISTORY_LIMIT).clamp(1, HISTORY_LIMIT_MAX);
        let jobs = self.jobs.list_for_user(user_id, limit).await?;
        let mut refreshed = Vec::with_capacity(jobs.len());
        for job in jobs {
            refreshed.push(self.refresh_stale(job).await?);
        }
        Ok(refreshed)
    }

    async fn resolve_targets(&self, user_id: &str) -> Result<Vec<BatchTarget>> {
        let Some(tag) = self
            .tags
            .find_by_name(user_id, &self.config.target_tag_name)
            .await?
        else {
            return Ok(Vec::new());
        };
        self.bookmarks.list_by_tag(user_id, tag.id, true).await
    }

    /// Mark an active job without a live runner as interrupted.
    async fn refresh_stale(&self, job: BatchJob) -> Result<BatchJob> {
        if job.status.is_terminal()
            || self.registry.is_running(job.id)
            || self.registry.is_starting(&job.user_id)
        {
            return Ok(job);
        }

        match self.jobs.mark_interrupted(job.id, INTERRUPTED_MESSAGE).await? {
            Some(failed) => {
                warn!(
                    subsystem = "jobs",
                    component = "batch_manager",
                    op = "recover",
                    job_id = failed.id,
                    user_id = %failed.user_id,
                    processed = failed.processed_count,
                    total = failed.total_count,
                    "Active batch job had no runner, marked interrupted"
                );
                self.emit(BatchJobEvent::JobInterrupted { job_id: failed.id });
                Ok(failed)
            }
            // The runner finished between the read and the update.
            None => Ok(self.jobs.get(job.id).await?.unwrap_or(job)),
        }
    }

    fn spawn_runner(&self, job: BatchJob, targets: Vec<BatchTarget>) {
        let job_id = job.id;
        let manager = self.clone();
        let spawned = self.registry.spawn(job_id, async move {
            manager.run_job(job, targets).await;
        });
        if !spawned {
            warn!(
                subsystem = "jobs",
                component = "batch_manager",
                job_id,
                "Runner already attached, not spawning another"
            );
        }
    }

    /// Drive a job to a terminal state, failing it if anything panics.
    async fn run_job(&self, job: BatchJob, targets: Vec<BatchTarget>) {
        let job_id = job.id;
        let run = AssertUnwindSafe(self.drive_job(job, targets)).catch_unwind();
        if let Err(payload) = run.await {
            self.fail_job(job_id, &panic_message(payload.as_ref())).await;
        }
    }

    async fn drive_job(&self, job: BatchJob, targets: Vec<BatchTarget>) {
        let start = Instant::now();
        let job_id = job.id;
        let ctx = EnrichContext::new(
            job.user_id.clone(),
            job.target_tag_name.clone(),
            Arc::clone(&self.tags),
            Arc::clone(&self.bookmarks),
            Arc::clone(&self.analyzer),
        );
        let ctx = &ctx;

        let result = run_batch(
            targets,
            usize::try_from(job.concurrency).unwrap_or(1),
            move || self.should_stop(job_id),
            move |target: BatchTarget| async move { enrich_bookmark(ctx, &target).await },
            move |outcome| self.record_outcome(job_id, outcome),
        )
        .await;

        match result {
            Ok(summary) => self.finish_job(job_id, summary, start).await,
            Err(err) => self.fail_job(job_id, &err.to_string()).await,
        }
    }

    async fn should_stop(&self, job_id: JobId) -> Result<bool> {
        Ok(match self.jobs.get(job_id).await? {
            Some(job) => job.pause_requested || job.status != BatchJobStatus::Running,
            None => true,
        })
    }

    async fn record_outcome(&self, job_id: JobId, outcome: ItemOutcome) -> Result<()> {
        self.jobs.record_outcome(job_id, &outcome).await?;
        if let ItemOutcome::Failure(message) = &outcome {
            warn!(
                subsystem = "jobs",
                component = "batch_manager",
                job_id,
                error = %message,
                "Batch item failed"
            );
        }
        self.emit(BatchJobEvent::ItemFinished {
            job_id,
            ok: outcome.is_ok(),
            message: outcome.message().map(str::to_string),
        });
        Ok(())
    }

    async fn finish_job(&self, job_id: JobId, summary: BatchRunSummary, start: Instant) {
        match self.jobs.finalize(job_id).await {
            Ok(Some(job)) => {
                info!(
                    subsystem = "jobs",
                    component = "batch_manager",
                    op = "finalize",
                    job_id,
                    status = %job.status,
                    processed = job.processed_count,
                    succeeded = job.success_count,
                    failed = job.failed_count,
                    total = job.total_count,
                    stopped = summary.stopped,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Batch job finished"
                );
                self.emit(BatchJobEvent::JobFinished {
                    job_id,
                    status: job.status,
                });
            }
            Ok(None) => debug!(
                subsystem = "jobs",
                component = "batch_manager",
                op = "finalize",
                job_id,
                "Batch job already terminal, finalize skipped"
            ),
            Err(err) => self.fail_job(job_id, &err.to_string()).await,
        }
    }

    async fn fail_job(&self, job_id: JobId, message: &str) {
        let message = normalize_error_message(message);
        error!(
            subsystem = "jobs",
            component = "batch_manager",
            op = "fail",
            job_id,
            error = %message,
            "Batch job failed"
        );
        if let Err(err) = self.jobs.mark_failed(job_id, &message).await {
            error!(
                subsystem = "jobs",
                component = "batch_manager",
                op = "fail",
                job_id,
                error = %err,
                "Could not record batch job failure"
            );
        }
        self.emit(BatchJobEvent::JobFailed {
            job_id,
            error: message,
        });
    }
}
