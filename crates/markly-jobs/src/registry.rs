//! In-process registry of live batch runners.
//!
//! A job row that claims to be active but has no entry here was orphaned by
//! a previous process. Entries are removed by a guard owned by the runner
//! task, so every exit path (normal return, fatal error, panic, abort)
//! unregisters the job.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::AbortHandle;
use tracing::{debug, info};

use markly_core::JobId;

#[derive(Default)]
struct RegistryState {
    runners: HashMap<JobId, Option<AbortHandle>>,
    /// Users currently inside `start`, with the number of concurrent calls.
    starting: HashMap<String, usize>,
}

/// Tracks which job ids have a runner attached in this process.
#[derive(Clone, Default)]
pub struct JobRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn `run` as the runner of `job_id`.
    ///
    /// Returns `false` without spawning when the job already has a live
    /// runner.
    pub fn spawn<F>(&self, job_id: JobId, run: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut state = self.lock();
            if state.runners.contains_key(&job_id) {
                return false;
            }
            // Reserve the slot first; the handle is filled in after spawning.
            state.runners.insert(job_id, None);
        }

        let guard = RunnerGuard {
            registry: self.clone(),
            job_id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            run.await;
        });

        let mut state = self.lock();
        // A runner that already finished has removed its slot.
        if let Some(slot) = state.runners.get_mut(&job_id) {
            *slot = Some(handle.abort_handle());
        }
        debug!(
            subsystem = "jobs",
            component = "registry",
            job_id,
            live = state.runners.len(),
            "Runner registered"
        );
        true
    }

    /// Whether `job_id` has a live runner.
    pub fn is_running(&self, job_id: JobId) -> bool {
        self.lock().runners.contains_key(&job_id)
    }

    /// Number of live runners.
    pub fn len(&self) -> usize {
        self.lock().runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark `user_id` as mid-start until the returned guard is dropped.
    pub fn begin_start(&self, user_id: &str) -> StartGuard {
        *self.lock().starting.entry(user_id.to_string()).or_insert(0) += 1;
        StartGuard {
            registry: self.clone(),
            user_id: user_id.to_string(),
        }
    }

    /// Whether a `start` call for `user_id` is in progress.
    pub fn is_starting(&self, user_id: &str) -> bool {
        self.lock().starting.contains_key(user_id)
    }

    /// Abort every live runner and return how many were aborted.
    ///
    /// Aborted jobs keep their active status until the next read marks them
    /// interrupted.
    pub fn abort_all(&self) -> usize {
        let handles: Vec<AbortHandle> = self.lock().runners.values().flatten().cloned().collect();
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            info!(
                subsystem = "jobs",
                component = "registry",
                aborted = handles.len(),
                "Aborted batch runners"
            );
        }
        handles.len()
    }

    fn unregister(&self, job_id: JobId) {
        if self.lock().runners.remove(&job_id).is_some() {
            debug!(
                subsystem = "jobs",
                component = "registry",
                job_id,
                "Runner unregistered"
            );
        }
    }

    fn finish_start(&self, user_id: &str) {
        let mut state = self.lock();
        if let Some(count) = state.starting.get_mut(user_id) {
            *count -= 1;
            if *count == 0 {
                state.starting.remove(user_id);
            }
        }
    }
}

struct RunnerGuard {
    registry: JobRegistry,
    job_id: JobId,
}

impl Drop for RunnerGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.job_id);
    }
}

/// Keeps a user marked as mid-start; see [`JobRegistry::begin_start`].
pub struct StartGuard {
    registry: JobRegistry,
    user_id: String,
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        self.registry.finish_start(&self.user_id);
    }
}
