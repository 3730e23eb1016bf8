//! End-to-end engine tests against mock collaborators and an in-memory
//! repository.

use std::sync::Arc;
use std::time::Duration;

use retrack_core::config::SchedulerConfig;
use retrack_core::fetcher::FetchError;
use retrack_core::store::StoreError;
use retrack_core::testing::{MockFetcher, MockNotifier, MockRepo, MockStore, RecordedStoreOp};
use retrack_core::{
    Notifier, PageFetcher, ReconcileError, ReconcileOutcome, Reconciler, SeriesRepository,
    SqliteSeriesRepository, TorrentStore,
};

struct Harness {
    fetcher: Arc<MockFetcher>,
    store: Arc<MockStore>,
    notifier: Arc<MockNotifier>,
    engine: Arc<Reconciler>,
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        enabled: true,
        poll_interval_secs: 3600,
        item_delay_ms: 1,
    }
}

fn build_harness(repo: Arc<dyn SeriesRepository>, scheduler: SchedulerConfig) -> Harness {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::new());
    let notifier = Arc::new(MockNotifier::new());

    let engine = Arc::new(Reconciler::new(
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        Arc::clone(&store) as Arc<dyn TorrentStore>,
        repo,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        scheduler,
        false,
    ));

    Harness {
        fetcher,
        store,
        notifier,
        engine,
    }
}

fn harness() -> Harness {
    build_harness(
        Arc::new(SqliteSeriesRepository::in_memory().unwrap()),
        scheduler_config(),
    )
}

fn page_url(topic_id: u32) -> String {
    format!("https://tracker.example/forum/viewtopic.php?t={}", topic_id)
}

#[tokio::test]
async fn test_track_performs_initial_swap() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show S01", "rev-A").await;

    let result = h.engine.track(&page_url(100), 42).await.unwrap();
    assert!(result.initial_sync_error.is_none());
    assert_eq!(result.series.id, 1);
    assert_eq!(result.series.title, "Show S01");
    assert_eq!(result.series.update_marker, "rev-A");
    assert_eq!(result.series.added_by, 42);

    // The initial payload lands through the normal replace path.
    assert_eq!(
        h.store.operations().await,
        vec![
            RecordedStoreOp::DeleteByTag {
                tag: "id_1".to_string(),
                delete_files: false
            },
            RecordedStoreOp::Add {
                tag: "id_1".to_string(),
                payload_len: b"payload-100".len()
            },
        ]
    );
    assert_eq!(h.store.entries_for_tag("id_1").await.len(), 1);
}

#[tokio::test]
async fn test_track_duplicate_url_is_rejected() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;

    h.engine.track(&page_url(100), 1).await.unwrap();
    let err = h.engine.track(&page_url(100), 1).await.unwrap_err();
    assert!(matches!(err, ReconcileError::AlreadyTracked(_)));
}

#[tokio::test]
async fn test_raced_allocation_is_retried_with_a_fresh_slot() {
    let repo = Arc::new(MockRepo::new());
    let h = build_harness(
        Arc::clone(&repo) as Arc<dyn SeriesRepository>,
        scheduler_config(),
    );
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;

    repo.fail_next_inserts(2);
    let result = h.engine.track(&page_url(100), 1).await.unwrap();
    assert_eq!(result.series.id, 1);
    assert!(result.initial_sync_error.is_none());
    assert_eq!(repo.insert_attempts(), 3);
}

#[tokio::test]
async fn test_exhausted_allocation_retries_surface_the_conflict() {
    let repo = Arc::new(MockRepo::new());
    let h = build_harness(
        Arc::clone(&repo) as Arc<dyn SeriesRepository>,
        scheduler_config(),
    );
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;

    repo.fail_next_inserts(4);
    let err = h.engine.track(&page_url(100), 1).await.unwrap_err();
    assert!(matches!(err, ReconcileError::AllocationConflict));

    // Nothing tracked and nothing touched the store.
    assert!(h.engine.list_series().unwrap().is_empty());
    assert_eq!(h.store.operation_count().await, 0);
}

#[tokio::test]
async fn test_track_unresolvable_url_is_rejected() {
    let h = harness();
    let err = h
        .engine
        .track("https://tracker.example/forum/index.php", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ResolveFailed(_)));
    assert!(h.engine.list_series().unwrap().is_empty());
}

#[tokio::test]
async fn test_unchanged_page_performs_no_store_calls() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();
    let ops_after_track = h.store.operation_count().await;

    let outcome = h.engine.reconcile_by_id(1).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(h.store.operation_count().await, ops_after_track);
}

#[tokio::test]
async fn test_changed_marker_replaces_entry_and_persists_marker() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show S01", "rev-A").await;
    h.engine.track(&page_url(100), 42).await.unwrap();

    h.fetcher
        .set_page(&page_url(100), "Show S01 + S02", "rev-B")
        .await;
    h.fetcher.set_payload("100", b"updated-payload".to_vec()).await;

    let outcome = h.engine.reconcile_by_id(1).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            title: "Show S01 + S02".to_string(),
            update_marker: "rev-B".to_string(),
        }
    );

    // Exactly one entry under the tag; marker and title persisted.
    assert_eq!(h.store.entries_for_tag("id_1").await.len(), 1);
    let series = h.engine.get_series(1).unwrap().unwrap();
    assert_eq!(series.update_marker, "rev-B");
    assert_eq!(series.title, "Show S01 + S02");

    // The owner was told about the update.
    let messages = h.notifier.messages_for(42).await;
    assert!(messages.iter().any(|m| m.contains("rev-B")));
}

#[tokio::test]
async fn test_marker_change_in_any_direction_triggers_replace() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "02-Jan-2025").await;
    h.engine.track(&page_url(100), 1).await.unwrap();

    // A marker that looks "older" still counts as a change.
    h.fetcher.set_page(&page_url(100), "Show", "01-Jan-2025").await;
    let outcome = h.engine.reconcile_by_id(1).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Updated { .. }));
    assert_eq!(
        h.engine.get_series(1).unwrap().unwrap().update_marker,
        "01-Jan-2025"
    );
}

#[tokio::test]
async fn test_stale_snapshot_does_not_repeat_swap() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 42).await.unwrap();

    // Capture a snapshot, then let an on-demand refresh advance the marker
    // behind its back.
    let stale = h.engine.get_series(1).unwrap().unwrap();
    assert_eq!(stale.update_marker, "rev-A");
    h.fetcher.set_page(&page_url(100), "Show", "rev-B").await;
    h.engine.reconcile_by_id(1).await.unwrap();

    let ops_after_refresh = h.store.operation_count().await;
    let messages_after_refresh = h.notifier.messages_for(42).await.len();

    // Reconciling through the stale snapshot compares against current
    // stored state, so nothing is re-swapped or re-announced.
    let outcome = h.engine.reconcile(&stale).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(h.store.operation_count().await, ops_after_refresh);
    assert_eq!(h.notifier.messages_for(42).await.len(), messages_after_refresh);
}

#[tokio::test]
async fn test_download_failure_keeps_marker_for_retry() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();

    h.fetcher.set_page(&page_url(100), "Show", "rev-B").await;
    h.fetcher.fail_next_download(FetchError::Timeout).await;

    let err = h.engine.reconcile_by_id(1).await.unwrap_err();
    assert!(matches!(err, ReconcileError::DownloadFailed(_)));

    // Marker not advanced, so the next pass retries the same swap.
    assert_eq!(
        h.engine.get_series(1).unwrap().unwrap().update_marker,
        "rev-A"
    );
    let outcome = h.engine.reconcile_by_id(1).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Updated { .. }));
    assert_eq!(
        h.engine.get_series(1).unwrap().unwrap().update_marker,
        "rev-B"
    );
}

#[tokio::test]
async fn test_add_failure_keeps_marker_and_notifies_owner() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 42).await.unwrap();

    h.fetcher.set_page(&page_url(100), "Show", "rev-B").await;
    h.store
        .fail_next_add(StoreError::ApiError("disk full".to_string()))
        .await;

    let err = h.engine.reconcile_by_id(1).await.unwrap_err();
    assert!(matches!(err, ReconcileError::AddFailed(_)));
    assert_eq!(
        h.engine.get_series(1).unwrap().unwrap().update_marker,
        "rev-A"
    );
    let messages = h.notifier.messages_for(42).await;
    assert!(messages.iter().any(|m| m.contains("failed")));
}

#[tokio::test]
async fn test_delete_failure_during_replace_is_not_fatal() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();

    h.fetcher.set_page(&page_url(100), "Show", "rev-B").await;
    h.store
        .fail_next_delete(StoreError::ApiError("flaky".to_string()))
        .await;

    // The swap proceeds to the add despite the failed delete.
    let outcome = h.engine.reconcile_by_id(1).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Updated { .. }));
}

#[tokio::test]
async fn test_untrack_removes_entry_and_record() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();

    h.engine.untrack(1, true).await.unwrap();
    assert!(h.engine.get_series(1).unwrap().is_none());
    assert!(h.store.entries_for_tag("id_1").await.is_empty());
    assert!(matches!(
        h.store.operations().await.last(),
        Some(RecordedStoreOp::DeleteByTag {
            delete_files: true,
            ..
        })
    ));
}

#[tokio::test]
async fn test_second_untrack_fails_without_store_side_effects() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();
    h.engine.untrack(1, false).await.unwrap();

    let ops_before = h.store.operation_count().await;
    let err = h.engine.untrack(1, false).await.unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound(1)));
    assert_eq!(h.store.operation_count().await, ops_before);
}

#[tokio::test]
async fn test_untrack_delete_failure_keeps_record() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();

    h.store
        .fail_next_delete(StoreError::ConnectionFailed("down".to_string()))
        .await;
    let err = h.engine.untrack(1, false).await.unwrap_err();
    assert!(matches!(err, ReconcileError::DeleteFailed(_)));

    // Record kept, so the id cannot be reused over the orphaned entry.
    assert!(h.engine.get_series(1).unwrap().is_some());
    h.engine.untrack(1, false).await.unwrap();
}

#[tokio::test]
async fn test_freed_id_is_reused_by_next_track() {
    let h = harness();
    for topic in [100, 101, 102] {
        h.fetcher
            .set_page(&page_url(topic), &format!("Show {}", topic), "rev-A")
            .await;
        h.engine.track(&page_url(topic), 1).await.unwrap();
    }

    h.engine.untrack(2, false).await.unwrap();

    h.fetcher.set_page(&page_url(103), "Show 103", "rev-A").await;
    let result = h.engine.track(&page_url(103), 1).await.unwrap();
    assert_eq!(result.series.id, 2);
}

#[tokio::test]
async fn test_batch_pass_continues_past_failing_series() {
    let h = harness();
    for topic in [100, 101, 102] {
        h.fetcher
            .set_page(&page_url(topic), &format!("Show {}", topic), "rev-A")
            .await;
        h.engine.track(&page_url(topic), 1).await.unwrap();
    }

    // All three change; the middle one fails its fetch.
    for topic in [100, 101, 102] {
        h.fetcher
            .set_page(&page_url(topic), &format!("Show {}", topic), "rev-B")
            .await;
    }
    // Pass order is ascending id; the one-shot error fires on the first
    // fetch, so series 1 fails and the pass carries on.
    h.fetcher
        .fail_next_fetch(FetchError::ConnectionFailed("reset".to_string()))
        .await;

    let report = h.engine.reconcile_all().await;
    assert_eq!(report.attempted, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 2);

    assert_eq!(
        h.engine.get_series(1).unwrap().unwrap().update_marker,
        "rev-A"
    );
    assert_eq!(
        h.engine.get_series(2).unwrap().unwrap().update_marker,
        "rev-B"
    );
    assert_eq!(
        h.engine.get_series(3).unwrap().unwrap().update_marker,
        "rev-B"
    );
}

#[tokio::test]
async fn test_stop_interrupts_batch_pass_between_items() {
    let h = build_harness(
        Arc::new(SqliteSeriesRepository::in_memory().unwrap()),
        SchedulerConfig {
            enabled: true,
            poll_interval_secs: 3600,
            item_delay_ms: 60_000,
        },
    );
    for topic in [100, 101, 102] {
        h.fetcher
            .set_page(&page_url(topic), &format!("Show {}", topic), "rev-A")
            .await;
        h.engine.track(&page_url(topic), 1).await.unwrap();
    }
    for topic in [100, 101, 102] {
        h.fetcher
            .set_page(&page_url(topic), &format!("Show {}", topic), "rev-B")
            .await;
    }

    h.engine.start();
    let engine = Arc::clone(&h.engine);
    let pass = tokio::spawn(async move { engine.reconcile_all().await });

    // The first item completes immediately; the pass then sits in the
    // inter-item throttle, where the shutdown signal lands.
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.engine.stop();

    let report = pass.await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(
        h.engine.get_series(2).unwrap().unwrap().update_marker,
        "rev-A"
    );
    assert_eq!(
        h.engine.get_series(3).unwrap().unwrap().update_marker,
        "rev-A"
    );
}

#[tokio::test]
async fn test_batch_pass_records_summary() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();

    h.engine.reconcile_all().await;
    let status = h.engine.status().await;
    assert_eq!(status.tracked_series, 1);
    let last = status.last_pass.unwrap();
    assert_eq!(last.report.attempted, 1);
    assert_eq!(last.report.failed, 0);
}

#[tokio::test]
async fn test_scheduler_start_and_stop() {
    let h = harness();
    assert!(!h.engine.status().await.scheduler_running);

    h.engine.start();
    assert!(h.engine.status().await.scheduler_running);

    // Starting twice is a no-op.
    h.engine.start();
    assert!(h.engine.status().await.scheduler_running);

    h.engine.stop();
    assert!(!h.engine.status().await.scheduler_running);
}

#[tokio::test]
async fn test_clear_category_empties_store() {
    let h = harness();
    h.fetcher.set_page(&page_url(100), "Show", "rev-A").await;
    h.engine.track(&page_url(100), 1).await.unwrap();
    assert_eq!(h.store.total_entries().await, 1);

    h.engine.clear_category().await.unwrap();
    assert_eq!(h.store.total_entries().await, 0);
}
