//! Batch job repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};

use markly_core::{
    normalize_error_message, BatchJob, BatchJobRepository, BatchJobStatus, Error, ItemOutcome,
    JobId, NewBatchJob, Result,
};

/// Columns selected for every job read. The enum is read back as text.
const JOB_COLUMNS: &str = "id, user_id, status::text AS status, target_tag_name, concurrency, \
     total_count, processed_count, success_count, failed_count, pause_requested, last_error, \
     started_at, finished_at, created_at, updated_at";

/// PostgreSQL implementation of BatchJobRepository.
#[derive(Clone)]
pub struct PgBatchJobRepository {
    pool: Pool<Postgres>,
}

impl PgBatchJobRepository {
    /// Create a new PgBatchJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<BatchJob> {
        let status: String = row.get("status");
        Ok(BatchJob {
            id: row.get("id"),
            user_id: row.get("user_id"),
            status: status.parse::<BatchJobStatus>()?,
            target_tag_name: row.get("target_tag_name"),
            concurrency: row.get("concurrency"),
            total_count: row.get("total_count"),
            processed_count: row.get("processed_count"),
            success_count: row.get("success_count"),
            failed_count: row.get("failed_count"),
            pause_requested: row.get("pause_requested"),
            last_error: row.get("last_error"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn parse_optional(row: Option<sqlx::postgres::PgRow>) -> Result<Option<BatchJob>> {
        row.map(Self::parse_job_row).transpose()
    }
}

#[async_trait]
impl BatchJobRepository for PgBatchJobRepository {
    async fn insert(&self, job: NewBatchJob) -> Result<Option<BatchJob>> {
        // The partial unique index admits one running/pausing row per user;
        // a conflicting insert returns no row instead of an error.
        let row = sqlx::query(&format!(
            "INSERT INTO ai_batch_job
                (user_id, status, target_tag_name, concurrency, total_count,
                 started_at, finished_at)
             VALUES ($1, $2::ai_batch_job_status, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id) WHERE status IN ('running', 'pausing') DO NOTHING
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(&job.user_id)
        .bind(job.status.as_str())
        .bind(&job.target_tag_name)
        .bind(job.concurrency)
        .bind(job.total_count)
        .bind(job.started_at)
        .bind(job.finished_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let inserted = Self::parse_optional(row)?;
        match &inserted {
            Some(created) => debug!(
                subsystem = "database",
                component = "batch_jobs",
                op = "insert",
                job_id = created.id,
                user_id = %created.user_id,
                status = %created.status,
                total = created.total_count,
                "Batch job inserted"
            ),
            None => debug!(
                subsystem = "database",
                component = "batch_jobs",
                op = "insert",
                user_id = %job.user_id,
                "Active batch job already exists, insert skipped"
            ),
        }
        Ok(inserted)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<BatchJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ai_batch_job WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_optional(row)
    }

    async fn get_for_user(&self, job_id: JobId, user_id: &str) -> Result<Option<BatchJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ai_batch_job WHERE id = $1 AND user_id = $2"
        ))
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_optional(row)
    }

    async fn latest_for_user(&self, user_id: &str) -> Result<Option<BatchJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ai_batch_job
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_optional(row)
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<BatchJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ai_batch_job
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_job_row).collect()
    }

    async fn record_outcome(&self, job_id: JobId, outcome: &ItemOutcome) -> Result<()> {
        let result = match outcome {
            ItemOutcome::Success => {
                sqlx::query(
                    "UPDATE ai_batch_job
                     SET processed_count = processed_count + 1,
                         success_count = success_count + 1,
                         updated_at = NOW()
                     WHERE id = $1 AND processed_count < total_count",
                )
                .bind(job_id)
                .execute(&self.pool)
                .await
            }
            ItemOutcome::Failure(message) => {
                sqlx::query(
                    "UPDATE ai_batch_job
                     SET processed_count = processed_count + 1,
                         failed_count = failed_count + 1,
                         last_error = $2,
                         updated_at = NOW()
                     WHERE id = $1 AND processed_count < total_count",
                )
                .bind(job_id)
                .bind(normalize_error_message(message))
                .execute(&self.pool)
                .await
            }
        }
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            warn!(
                subsystem = "database",
                component = "batch_jobs",
                op = "record_outcome",
                job_id,
                "Outcome not recorded: job missing or already fully counted"
            );
        }
        Ok(())
    }

    async fn request_pause(&self, job_id: JobId, user_id: &str) -> Result<Option<BatchJob>> {
        let row = sqlx::query(&format!(
            "UPDATE ai_batch_job
             SET status = 'pausing', pause_requested = TRUE, updated_at = NOW()
             WHERE id = $1 AND user_id = $2 AND status IN ('running', 'pausing')
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_optional(row)
    }

    async fn finalize(&self, job_id: JobId) -> Result<Option<BatchJob>> {
        let row = sqlx::query(&format!(
            "UPDATE ai_batch_job
             SET status = CASE
                     WHEN pause_requested OR status = 'pausing'
                         THEN 'paused'::ai_batch_job_status
                     ELSE 'completed'::ai_batch_job_status
                 END,
                 finished_at = NOW(),
                 updated_at = NOW()
             WHERE id = $1 AND status IN ('running', 'pausing')
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_optional(row)
    }

    async fn mark_failed(&self, job_id: JobId, message: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ai_batch_job
             SET status = 'failed', last_error = $2, finished_at = NOW(), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(normalize_error_message(message))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("batch job {job_id} not found")));
        }
        Ok(())
    }

    async fn mark_interrupted(&self, job_id: JobId, message: &str) -> Result<Option<BatchJob>> {
        let row = sqlx::query(&format!(
            "UPDATE ai_batch_job
             SET status = 'failed', last_error = $2, finished_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status IN ('running', 'pausing')
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(normalize_error_message(message))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_optional(row)
    }
}
