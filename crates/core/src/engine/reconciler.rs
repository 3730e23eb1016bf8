//! Per-series reconciliation and the batch pass.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::fetcher::{FetchError, PageFetcher};
use crate::metrics::{PASS_DURATION, RECONCILE_CHECKS, RECONCILE_FAILURES, SERIES_OPERATIONS};
use crate::notify::Notifier;
use crate::repo::{RepoError, Series, SeriesRepository};
use crate::store::TorrentStore;

use super::types::{
    series_tag, BatchReport, EngineStatus, PassSummary, ReconcileError, ReconcileOutcome,
    TrackResult,
};

/// How many times a raced id allocation is retried with a fresh slot.
const ALLOCATION_RETRIES: u32 = 3;

/// The reconciliation engine.
///
/// Owns the fetch → compare → swap flow for one series and the sequential
/// batch pass over all of them. On-demand calls and the scheduled pass go
/// through a per-series async lock, so the at-most-one-active-download
/// invariant holds even when a user refresh races the background loop.
pub struct Reconciler {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn TorrentStore>,
    repo: Arc<dyn SeriesRepository>,
    notifier: Arc<dyn Notifier>,
    pub(super) scheduler: SchedulerConfig,
    /// Whether replacing a stale entry also deletes its files on disk.
    replace_delete_files: bool,

    // Runtime state
    series_locks: StdMutex<HashMap<u32, Arc<Mutex<()>>>>,
    pub(super) running: AtomicBool,
    pub(super) shutdown_tx: broadcast::Sender<()>,
    last_pass: RwLock<Option<PassSummary>>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn TorrentStore>,
        repo: Arc<dyn SeriesRepository>,
        notifier: Arc<dyn Notifier>,
        scheduler: SchedulerConfig,
        replace_delete_files: bool,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            fetcher,
            store,
            repo,
            notifier,
            scheduler,
            replace_delete_files,
            series_locks: StdMutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
            last_pass: RwLock::new(None),
        }
    }

    /// Get (or create) the lock for a series id.
    fn series_lock(&self, id: u32) -> Arc<Mutex<()>> {
        let mut locks = self.series_locks.lock().unwrap();
        Arc::clone(locks.entry(id).or_default())
    }

    /// Check one series and swap the store entry if its page changed.
    ///
    /// `unchanged` performs zero store calls. On any failure after the
    /// change was detected, the stored marker is left untouched so the next
    /// pass retries the same swap.
    pub async fn reconcile(&self, series: &Series) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_by_id(series.id).await
    }

    /// Reconcile a series by id.
    pub async fn reconcile_by_id(&self, id: u32) -> Result<ReconcileOutcome, ReconcileError> {
        let lock = self.series_lock(id);
        let _guard = lock.lock().await;

        let result = self.reconcile_locked(id).await;
        match &result {
            Ok(ReconcileOutcome::Unchanged) => {
                RECONCILE_CHECKS.with_label_values(&["unchanged"]).inc();
            }
            Ok(ReconcileOutcome::Updated { .. }) => {
                RECONCILE_CHECKS.with_label_values(&["updated"]).inc();
            }
            Err(e) => {
                RECONCILE_CHECKS.with_label_values(&["failed"]).inc();
                RECONCILE_FAILURES.with_label_values(&[e.kind()]).inc();
            }
        }
        result
    }

    async fn reconcile_locked(&self, id: u32) -> Result<ReconcileOutcome, ReconcileError> {
        // Re-read under the lock. A caller's snapshot may have gone stale
        // while a concurrent reconcile for the same series held the lock,
        // and comparing against it would repeat an already-performed swap.
        let series = self
            .repo
            .get(id)
            .map_err(ReconcileError::Repository)?
            .ok_or(ReconcileError::NotFound(id))?;

        let snapshot = self
            .fetcher
            .fetch_page(&series.url)
            .await
            .map_err(|e| match e {
                FetchError::ResolveFailed(url) => ReconcileError::ResolveFailed(url),
                other => ReconcileError::FetchFailed(other),
            })?;

        // Exact string equality is the only change-detection rule; the
        // marker contents carry no semantics here.
        if snapshot.update_marker == series.update_marker {
            debug!(series_id = series.id, "no change detected");
            return Ok(ReconcileOutcome::Unchanged);
        }

        info!(
            series_id = series.id,
            url = %series.url,
            old_marker = %series.update_marker,
            new_marker = %snapshot.update_marker,
            "update detected"
        );

        // Delete before download: a failed download must not leave a stale
        // entry behind, and the gap until the add is short. A delete failure
        // is non-fatal; the store's own idempotency governs duplicates.
        let tag = series_tag(series.id);
        if let Err(e) = self.store.delete_by_tag(&tag, self.replace_delete_files).await {
            warn!(
                series_id = series.id,
                tag = %tag,
                "failed to clear stale entry, proceeding to add: {}",
                e
            );
        }

        let payload = self
            .fetcher
            .download_payload(&snapshot.topic_id)
            .await
            .map_err(ReconcileError::DownloadFailed)?;

        if let Err(e) = self.store.add(payload, &tag).await {
            self.notifier
                .notify(
                    series.added_by,
                    &format!(
                        "Update detected for \"{}\" but submitting it to the download client failed. Will retry on the next pass.",
                        snapshot.title
                    ),
                )
                .await;
            return Err(ReconcileError::AddFailed(e));
        }

        self.repo
            .update(
                series.id,
                Some(&snapshot.title),
                Some(&snapshot.update_marker),
            )
            .map_err(ReconcileError::Repository)?;

        info!(series_id = series.id, title = %snapshot.title, "entry replaced");

        self.notifier
            .notify(
                series.added_by,
                &format!(
                    "Release updated: {}\nNew revision: {}\nThe new torrent was submitted to the download client.",
                    snapshot.title, snapshot.update_marker
                ),
            )
            .await;

        Ok(ReconcileOutcome::Updated {
            title: snapshot.title,
            update_marker: snapshot.update_marker,
        })
    }

    /// Start tracking a new series.
    ///
    /// Validates the url resolves, inserts the record with an empty marker,
    /// then runs a normal reconcile so the first payload lands through the
    /// same swap path. When that initial swap fails the series stays
    /// tracked and the error is reported in the result.
    pub async fn track(&self, url: &str, added_by: i64) -> Result<TrackResult, ReconcileError> {
        if self
            .repo
            .exists_by_url(url)
            .map_err(ReconcileError::Repository)?
        {
            SERIES_OPERATIONS
                .with_label_values(&["track", "failed"])
                .inc();
            return Err(ReconcileError::AlreadyTracked(url.to_string()));
        }

        let snapshot = self.fetcher.fetch_page(url).await.map_err(|e| {
            SERIES_OPERATIONS
                .with_label_values(&["track", "failed"])
                .inc();
            match e {
                FetchError::ResolveFailed(url) => ReconcileError::ResolveFailed(url),
                other => ReconcileError::FetchFailed(other),
            }
        })?;

        let mut attempts = 0;
        let series = loop {
            match self.repo.insert(url, &snapshot.title, "", added_by) {
                Ok(series) => break series,
                Err(RepoError::AllocationConflict(id)) => {
                    attempts += 1;
                    if attempts > ALLOCATION_RETRIES {
                        SERIES_OPERATIONS
                            .with_label_values(&["track", "failed"])
                            .inc();
                        return Err(ReconcileError::AllocationConflict);
                    }
                    warn!(id = id, attempt = attempts, "id allocation raced, retrying");
                }
                Err(RepoError::DuplicateUrl(url)) => {
                    SERIES_OPERATIONS
                        .with_label_values(&["track", "failed"])
                        .inc();
                    return Err(ReconcileError::AlreadyTracked(url));
                }
                Err(e) => {
                    SERIES_OPERATIONS
                        .with_label_values(&["track", "failed"])
                        .inc();
                    return Err(ReconcileError::Repository(e));
                }
            }
        };

        info!(series_id = series.id, url = url, "series tracked");
        SERIES_OPERATIONS.with_label_values(&["track", "ok"]).inc();

        let initial_sync_error = match self.reconcile(&series).await {
            Ok(_) => None,
            Err(e) => {
                warn!(
                    series_id = series.id,
                    "initial sync failed, will retry on next pass: {}", e
                );
                Some(e)
            }
        };

        // Refresh: a successful initial swap advanced title and marker.
        let series = self
            .repo
            .get(series.id)
            .map_err(ReconcileError::Repository)?
            .unwrap_or(series);

        Ok(TrackResult {
            series,
            initial_sync_error,
        })
    }

    /// Stop tracking a series.
    ///
    /// Clears the tagged store entry first and only then removes the
    /// record: if the record went first and the delete failed, the freed id
    /// could be reused while an orphaned entry still carries its tag.
    pub async fn untrack(&self, id: u32, delete_files: bool) -> Result<(), ReconcileError> {
        let lock = self.series_lock(id);
        let _guard = lock.lock().await;

        let series = self
            .repo
            .get(id)
            .map_err(ReconcileError::Repository)?
            .ok_or_else(|| {
                SERIES_OPERATIONS
                    .with_label_values(&["untrack", "failed"])
                    .inc();
                ReconcileError::NotFound(id)
            })?;

        self.store
            .delete_by_tag(&series_tag(id), delete_files)
            .await
            .map_err(|e| {
                SERIES_OPERATIONS
                    .with_label_values(&["untrack", "failed"])
                    .inc();
                ReconcileError::DeleteFailed(e)
            })?;

        self.repo.delete(id).map_err(|e| match e {
            RepoError::NotFound(id) => ReconcileError::NotFound(id),
            other => ReconcileError::Repository(other),
        })?;

        info!(series_id = id, url = %series.url, "series untracked");
        SERIES_OPERATIONS
            .with_label_values(&["untrack", "ok"])
            .inc();
        Ok(())
    }

    /// Run one reconciliation pass over every tracked series.
    ///
    /// Strictly sequential with the configured inter-item throttle; one
    /// series' failure never aborts the pass. Interruptible between items
    /// via the shutdown channel, never mid-item.
    pub async fn reconcile_all(&self) -> BatchReport {
        let start = Instant::now();
        let mut report = BatchReport::default();

        let series_list = match self.repo.list() {
            Ok(list) => list,
            Err(e) => {
                warn!("failed to list series for pass: {}", e);
                return report;
            }
        };

        info!(series = series_list.len(), "reconciliation pass started");
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let delay = Duration::from_millis(self.scheduler.item_delay_ms);

        for (i, series) in series_list.iter().enumerate() {
            // Throttle between items; the tracker and the store are both
            // rate-sensitive shared resources.
            if i > 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("reconciliation pass interrupted");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            report.attempted += 1;
            match self.reconcile(series).await {
                Ok(ReconcileOutcome::Updated { .. }) => report.updated += 1,
                Ok(ReconcileOutcome::Unchanged) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        series_id = series.id,
                        url = %series.url,
                        kind = e.kind(),
                        "reconcile failed: {}",
                        e
                    );
                }
            }
        }

        PASS_DURATION.observe(start.elapsed().as_secs_f64());
        info!(
            attempted = report.attempted,
            updated = report.updated,
            failed = report.failed,
            "reconciliation pass finished"
        );

        *self.last_pass.write().await = Some(PassSummary {
            finished_at: Utc::now(),
            report,
        });

        report
    }

    /// Clear every entry in the managed store category.
    pub async fn clear_category(&self) -> Result<(), ReconcileError> {
        self.store
            .clear_category()
            .await
            .map_err(ReconcileError::DeleteFailed)
    }

    /// List all tracked series.
    pub fn list_series(&self) -> Result<Vec<Series>, ReconcileError> {
        self.repo.list().map_err(ReconcileError::Repository)
    }

    /// Get one tracked series.
    pub fn get_series(&self, id: u32) -> Result<Option<Series>, ReconcileError> {
        self.repo.get(id).map_err(ReconcileError::Repository)
    }

    /// Current engine status.
    pub async fn status(&self) -> EngineStatus {
        let tracked_series = self.repo.list().map(|l| l.len()).unwrap_or(0);
        EngineStatus {
            scheduler_running: self
                .running
                .load(std::sync::atomic::Ordering::Relaxed),
            tracked_series,
            last_pass: *self.last_pass.read().await,
        }
    }
}
