//! Lifecycle events broadcast by the batch job manager.

use markly_core::{BatchJobStatus, JobId, UserId};

/// Event emitted while batch jobs run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchJobEvent {
    /// A runner was attached to a new job.
    JobStarted {
        job_id: JobId,
        user_id: UserId,
        total: i32,
    },
    /// One bookmark finished, successfully or not.
    ItemFinished {
        job_id: JobId,
        ok: bool,
        message: Option<String>,
    },
    /// The job drained or stopped and reached `paused` or `completed`.
    JobFinished {
        job_id: JobId,
        status: BatchJobStatus,
    },
    /// The run hit a fatal error and the job was forced to `failed`.
    JobFailed { job_id: JobId, error: String },
    /// A stale job was found on read and marked as interrupted.
    JobInterrupted { job_id: JobId },
}

impl BatchJobEvent {
    /// Job the event belongs to.
    pub fn job_id(&self) -> JobId {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::ItemFinished { job_id, .. }
            | Self::JobFinished { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobInterrupted { job_id } => *job_id,
        }
    }

    /// Whether no further events follow for this job.
    pub fn is_final(&self) -> bool {
        match self {
            Self::JobFinished { .. } | Self::JobFailed { .. } | Self::JobInterrupted { .. } => {
                true
            }
            Self::JobStarted { .. } | Self::ItemFinished { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_and_finality() {
        let started = BatchJobEvent::JobStarted {
            job_id: 4,
            user_id: "u1".to_string(),
            total: 2,
        };
        assert_eq!(started.job_id(), 4);
        assert!(!started.is_final());

        let finished = BatchJobEvent::JobFinished {
            job_id: 4,
            status: BatchJobStatus::Completed,
        };
        assert!(finished.is_final());
        assert!(BatchJobEvent::JobInterrupted { job_id: 9 }.is_final());
    }
}
