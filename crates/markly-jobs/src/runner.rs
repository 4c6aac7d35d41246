//! Bounded-concurrency worklist runner.
//!
//! [`run_batch`] drives up to `limit` worker loops over one shared cursor.
//! The loops are polled concurrently inside the caller's task, so they
//! overlap on awaits without needing `'static` closures. Each loop asks
//! `should_stop` before claiming the next item; claimed items always run to
//! completion. A failing or panicking item becomes an
//! [`ItemOutcome::Failure`] and never affects its siblings, while errors from
//! `should_stop` or `on_item_done` abort the whole run.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::try_join_all;
use futures::FutureExt;
use tracing::trace;

use markly_core::defaults::UNKNOWN_ERROR;
use markly_core::{ItemOutcome, Result};

/// Counts reported by a finished [`run_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchRunSummary {
    /// Items handed to the worker.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Whether `should_stop` fired before the list drained.
    pub stopped: bool,
}

/// Effective number of worker loops for `len` items.
pub fn clamp_limit(limit: usize, len: usize) -> usize {
    limit.min(len.max(1)).max(1)
}

struct Shared {
    cursor: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    stopped: AtomicBool,
}

/// Run `worker` over `items` with at most `limit` items in flight.
pub async fn run_batch<T, S, SFut, W, WFut, E, D, DFut>(
    items: Vec<T>,
    limit: usize,
    should_stop: S,
    worker: W,
    on_item_done: D,
) -> Result<BatchRunSummary>
where
    T: Clone,
    S: Fn() -> SFut,
    SFut: Future<Output = Result<bool>>,
    W: Fn(T) -> WFut,
    WFut: Future<Output = std::result::Result<(), E>>,
    E: Display,
    D: Fn(ItemOutcome) -> DFut,
    DFut: Future<Output = Result<()>>,
{
    let limit = clamp_limit(limit, items.len());
    let shared = Shared {
        cursor: AtomicUsize::new(0),
        succeeded: AtomicUsize::new(0),
        failed: AtomicUsize::new(0),
        stopped: AtomicBool::new(false),
    };

    let loops = (0..limit).map(|slot| {
        worker_loop(slot, &items, &shared, &should_stop, &worker, &on_item_done)
    });
    try_join_all(loops).await?;

    let succeeded = shared.succeeded.load(Ordering::SeqCst);
    let failed = shared.failed.load(Ordering::SeqCst);
    Ok(BatchRunSummary {
        processed: succeeded + failed,
        succeeded,
        failed,
        stopped: shared.stopped.load(Ordering::SeqCst),
    })
}

async fn worker_loop<T, S, SFut, W, WFut, E, D, DFut>(
    slot: usize,
    items: &[T],
    shared: &Shared,
    should_stop: &S,
    worker: &W,
    on_item_done: &D,
) -> Result<()>
where
    T: Clone,
    S: Fn() -> SFut,
    SFut: Future<Output = Result<bool>>,
    W: Fn(T) -> WFut,
    WFut: Future<Output = std::result::Result<(), E>>,
    E: Display,
    D: Fn(ItemOutcome) -> DFut,
    DFut: Future<Output = Result<()>>,
{
    loop {
        if should_stop().await? {
            shared.stopped.store(true, Ordering::SeqCst);
            return Ok(());
        }
        let index = shared.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(item) = items.get(index) else {
            return Ok(());
        };
        trace!(
            subsystem = "jobs",
            component = "runner",
            slot,
            index,
            "Claimed batch item"
        );

        let item = item.clone();
        let run = AssertUnwindSafe(async { worker(item).await }).catch_unwind();
        let outcome = match run.await {
            Ok(Ok(())) => ItemOutcome::Success,
            Ok(Err(err)) => ItemOutcome::Failure(error_message(&err.to_string())),
            Err(payload) => ItemOutcome::Failure(panic_message(payload.as_ref())),
        };

        if outcome.is_ok() {
            shared.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            shared.failed.fetch_add(1, Ordering::SeqCst);
        }
        on_item_done(outcome).await?;
    }
}

fn error_message(text: &str) -> String {
    if text.trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        text.to_string()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        error_message(text)
    } else if let Some(text) = payload.downcast_ref::<String>() {
        error_message(text)
    } else {
        UNKNOWN_ERROR.to_string()
    }
}
