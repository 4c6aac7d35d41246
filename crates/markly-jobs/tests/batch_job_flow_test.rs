//! End-to-end batch job flows over the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use markly_core::mock::{MemoryStore, MockAnalyzer};
use markly_jobs::{
    BatchConfig, BatchJob, BatchJobEvent, BatchJobManager, BatchJobStatus, Error, JobRegistry,
    PauseBatchJobRequest, StartBatchJobRequest, WebsiteAnalysis,
};

const USER: &str = "user-1";

fn manager_with(store: &MemoryStore, analyzer: &MockAnalyzer) -> BatchJobManager {
    BatchJobManager::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(analyzer.clone()),
        JobRegistry::new(),
        BatchConfig::default(),
    )
}

/// Seed `count` bookmarks tagged with the catch-all tag.
fn seed_catch_all(store: &MemoryStore, count: usize) -> Vec<i64> {
    let other = store.add_tag(USER, "Other");
    (0..count)
        .map(|i| store.add_bookmark(USER, &format!("https://site{i}.example"), &[other.id], false))
        .collect()
}

async fn wait_for_finish(manager: &BatchJobManager, job_id: i64) -> BatchJob {
    for _ in 0..400 {
        if !manager.registry().is_running(job_id) {
            let job = manager.get(USER, job_id).await.unwrap().unwrap();
            assert!(job.status.is_terminal(), "job {job_id} left active: {job:?}");
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

fn assert_counters(job: &BatchJob) {
    assert_eq!(job.processed_count, job.success_count + job.failed_count);
    assert!(job.processed_count <= job.total_count);
}

#[tokio::test]
async fn test_no_targets_completes_immediately() {
    let store = MemoryStore::new();
    let analyzer = MockAnalyzer::new();
    let manager = manager_with(&store, &analyzer);

    let job = manager
        .start(USER, StartBatchJobRequest::new(2))
        .await
        .unwrap();

    assert_eq!(job.status, BatchJobStatus::Completed);
    assert_eq!(job.total_count, 0);
    assert_eq!(job.processed_count, 0);
    assert!(job.started_at.is_some());
    assert_eq!(job.started_at, job.finished_at);
    assert!(manager.registry().is_empty());
    assert_eq!(analyzer.call_count(), 0);
}

#[tokio::test]
async fn test_batch_enriches_all_targets() {
    let store = MemoryStore::new();
    let ids = seed_catch_all(&store, 6);
    let analyzer = MockAnalyzer::new().with_tags(vec!["Rust".to_string(), "web".to_string()]);
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(3))
        .await
        .unwrap();
    assert_eq!(started.status, BatchJobStatus::Running);
    assert_eq!(started.total_count, 6);

    let job = wait_for_finish(&manager, started.id).await;
    assert_eq!(job.status, BatchJobStatus::Completed);
    assert_eq!(job.processed_count, 6);
    assert_eq!(job.success_count, 6);
    assert!(job.finished_at.is_some());
    assert_counters(&job);

    let tags = store.tags_of(USER);
    let rust = tags.iter().find(|t| t.name == "Rust").unwrap();
    let web = tags.iter().find(|t| t.name == "web").unwrap();
    for id in ids {
        let bookmark = store.bookmark(id).unwrap();
        assert_eq!(bookmark.tag_ids, vec![rust.id, web.id]);
        assert!(bookmark.name.starts_with("Title of"));
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 10);
    let analyzer = MockAnalyzer::new().with_latency_ms(20);
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(2))
        .await
        .unwrap();
    let job = wait_for_finish(&manager, started.id).await;

    assert_eq!(job.processed_count, 10);
    assert!(analyzer.peak_in_flight() <= 2);
    assert_eq!(analyzer.call_count(), 10);
}

#[tokio::test]
async fn test_second_start_returns_active_job() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 5);
    let analyzer = MockAnalyzer::new().with_latency_ms(50);
    let manager = manager_with(&store, &analyzer);

    let first = manager
        .start(USER, StartBatchJobRequest::new(1))
        .await
        .unwrap();
    let second = manager
        .start(USER, StartBatchJobRequest::new(4))
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.concurrency, 1);
    assert_eq!(store.job_count(USER), 1);

    manager.shutdown();
}

#[tokio::test]
async fn test_fetch_failed_bookmarks_are_skipped() {
    let store = MemoryStore::new();
    let other = store.add_tag(USER, "Other");
    let good = store.add_bookmark(USER, "https://good.example", &[other.id], false);
    let broken = store.add_bookmark(USER, "https://broken.example", &[other.id], true);
    let analyzer = MockAnalyzer::new().with_tags(vec!["News".to_string()]);
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(2))
        .await
        .unwrap();
    assert_eq!(started.total_count, 1);

    wait_for_finish(&manager, started.id).await;
    assert_ne!(store.bookmark(good).unwrap().tag_ids, vec![other.id]);
    assert_eq!(store.bookmark(broken).unwrap().tag_ids, vec![other.id]);
    assert_eq!(analyzer.call_count(), 1);
}

#[tokio::test]
async fn test_item_failures_do_not_stop_the_batch() {
    let store = MemoryStore::new();
    let other = store.add_tag(USER, "Other");
    store.add_bookmark(USER, "https://a.example", &[other.id], false);
    store.add_bookmark(USER, "https://down.example", &[other.id], false);
    store.add_bookmark(USER, "https://crash.example", &[other.id], false);
    store.add_bookmark(USER, "https://b.example", &[other.id], false);
    let analyzer = MockAnalyzer::new()
        .with_failing_url("https://down.example")
        .with_panicking_url("https://crash.example")
        .with_response(
            "https://b.example",
            WebsiteAnalysis {
                title: "B".to_string(),
                ..Default::default()
            },
        );
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(1))
        .await
        .unwrap();
    let job = wait_for_finish(&manager, started.id).await;

    assert_eq!(job.status, BatchJobStatus::Completed);
    assert_eq!(job.processed_count, 4);
    assert_eq!(job.success_count, 2);
    assert_eq!(job.failed_count, 2);
    assert_counters(&job);
    // Items run in id order with one worker, so the panic is the last failure.
    assert_eq!(
        job.last_error.as_deref(),
        Some("analyzer crashed on https://crash.example")
    );
}

#[tokio::test]
async fn test_pause_stops_claiming_new_items() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 20);
    let analyzer = MockAnalyzer::new().with_latency_ms(30);
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(2))
        .await
        .unwrap();
    let pausing = manager
        .pause(USER, PauseBatchJobRequest::new(started.id))
        .await
        .unwrap();
    assert_eq!(pausing.status, BatchJobStatus::Pausing);
    assert!(pausing.pause_requested);

    // Repeated pause requests are idempotent while the runner drains.
    let again = manager
        .pause(USER, PauseBatchJobRequest::new(started.id))
        .await
        .unwrap();
    assert_eq!(again.status, BatchJobStatus::Pausing);

    let job = wait_for_finish(&manager, started.id).await;
    assert_eq!(job.status, BatchJobStatus::Paused);
    assert!(job.processed_count < job.total_count);
    assert!(job.finished_at.is_some());
    assert_counters(&job);

    let err = manager
        .pause(USER, PauseBatchJobRequest::new(started.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Job(_)));
}

#[tokio::test]
async fn test_paused_job_can_be_followed_by_a_new_one() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 8);
    let analyzer = MockAnalyzer::new()
        .with_tags(vec!["Rust".to_string()])
        .with_latency_ms(30);
    let manager = manager_with(&store, &analyzer);

    let first = manager
        .start(USER, StartBatchJobRequest::new(1))
        .await
        .unwrap();
    manager
        .pause(USER, PauseBatchJobRequest::new(first.id))
        .await
        .unwrap();
    let paused = wait_for_finish(&manager, first.id).await;
    assert_eq!(paused.status, BatchJobStatus::Paused);

    // Enriched bookmarks left the catch-all tag, so only the rest are targeted.
    let second = manager
        .start(USER, StartBatchJobRequest::new(3))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.total_count, 8 - paused.processed_count);

    wait_for_finish(&manager, second.id).await;
    let history = manager.history(USER, None).await.unwrap();
    assert_eq!(
        history.iter().map(|j| j.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
}

#[tokio::test]
async fn test_orphaned_job_is_recovered_on_start() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 2);
    let now = Utc::now();
    let orphan = store.seed_job(BatchJob {
        id: 0,
        user_id: USER.to_string(),
        status: BatchJobStatus::Running,
        target_tag_name: "Other".to_string(),
        concurrency: 3,
        total_count: 5,
        processed_count: 2,
        success_count: 2,
        failed_count: 0,
        pause_requested: false,
        last_error: None,
        started_at: Some(now),
        finished_at: None,
        created_at: now,
        updated_at: now,
    });
    let analyzer = MockAnalyzer::new();
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(2))
        .await
        .unwrap();
    assert_ne!(started.id, orphan.id);
    assert_eq!(started.total_count, 2);

    let recovered = manager.get(USER, orphan.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, BatchJobStatus::Failed);
    assert_eq!(recovered.processed_count, 2);
    assert!(recovered.last_error.is_some());

    wait_for_finish(&manager, started.id).await;
}

#[tokio::test]
async fn test_store_failure_fails_the_job() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 4);
    store.fail_outcome_writes(true);
    let analyzer = MockAnalyzer::new();
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(2))
        .await
        .unwrap();
    let job = wait_for_finish(&manager, started.id).await;

    assert_eq!(job.status, BatchJobStatus::Failed);
    assert!(job
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("job store unavailable")));
    assert!(job.finished_at.is_some());
    assert_eq!(job.processed_count, 0);
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_events_follow_the_job() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 3);
    let analyzer = MockAnalyzer::new().with_failing_url("https://site1.example");
    let manager = manager_with(&store, &analyzer);
    let mut events = manager.subscribe();

    let started = manager
        .start(USER, StartBatchJobRequest::new(1))
        .await
        .unwrap();

    let mut received = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap();
        let done = event.is_final();
        received.push(event);
        if done {
            break;
        }
    }

    assert_eq!(
        received.first(),
        Some(&BatchJobEvent::JobStarted {
            job_id: started.id,
            user_id: USER.to_string(),
            total: 3,
        })
    );
    let items: Vec<bool> = received
        .iter()
        .filter_map(|e| match e {
            BatchJobEvent::ItemFinished { ok, .. } => Some(*ok),
            _ => None,
        })
        .collect();
    assert_eq!(items, vec![true, false, true]);
    assert_eq!(
        received.last(),
        Some(&BatchJobEvent::JobFinished {
            job_id: started.id,
            status: BatchJobStatus::Completed,
        })
    );
}

#[tokio::test]
async fn test_shutdown_leaves_jobs_for_recovery() {
    let store = MemoryStore::new();
    seed_catch_all(&store, 10);
    let analyzer = MockAnalyzer::new().with_latency_ms(100);
    let manager = manager_with(&store, &analyzer);

    let started = manager
        .start(USER, StartBatchJobRequest::new(1))
        .await
        .unwrap();
    assert_eq!(manager.shutdown(), 1);

    for _ in 0..100 {
        if manager.registry().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(manager.registry().is_empty());

    let job = manager.latest(USER).await.unwrap().unwrap();
    assert_eq!(job.id, started.id);
    assert_eq!(job.status, BatchJobStatus::Failed);
    assert!(job.finished_at.is_some());
}
