//! Types for the reconciliation engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::fetcher::FetchError;
use crate::repo::{RepoError, Series};
use crate::store::StoreError;

/// Compute the store tag for a series id.
///
/// The tag is the join key between a series record and its store entry;
/// it must stay stable for the lifetime of the series.
pub fn series_tag(id: u32) -> String {
    format!("id_{}", id)
}

/// Errors a reconciliation operation can surface.
///
/// Every remote failure is caught at the point of call and converted into
/// one of these kinds; nothing escapes the batch loop.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The url does not map to a known topic. Permanent until the user
    /// fixes the url.
    #[error("URL does not resolve to a topic: {0}")]
    ResolveFailed(String),

    /// Transient page fetch problem; retried on the next pass.
    #[error("Page fetch failed: {0}")]
    FetchFailed(#[source] FetchError),

    /// Transient payload download problem. The stored marker is not
    /// advanced, so the next pass retries the same swap.
    #[error("Payload download failed: {0}")]
    DownloadFailed(#[source] FetchError),

    /// The store rejected the new entry. The stored marker is not advanced.
    #[error("Store add failed: {0}")]
    AddFailed(#[source] StoreError),

    /// The store could not clear the tag during untrack. The series record
    /// is kept so the id cannot be reused over an orphaned entry.
    #[error("Store delete failed: {0}")]
    DeleteFailed(#[source] StoreError),

    #[error("Series not found: {0}")]
    NotFound(u32),

    #[error("Series already tracked for url: {0}")]
    AlreadyTracked(String),

    /// Fresh-allocation retries were exhausted.
    #[error("Id allocation conflict")]
    AllocationConflict,

    #[error("Repository error: {0}")]
    Repository(#[source] RepoError),
}

impl ReconcileError {
    /// Stable kind label for logs, metrics and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::ResolveFailed(_) => "resolve_failed",
            ReconcileError::FetchFailed(_) => "fetch_failed",
            ReconcileError::DownloadFailed(_) => "download_failed",
            ReconcileError::AddFailed(_) => "add_failed",
            ReconcileError::DeleteFailed(_) => "delete_failed",
            ReconcileError::NotFound(_) => "not_found",
            ReconcileError::AlreadyTracked(_) => "already_tracked",
            ReconcileError::AllocationConflict => "allocation_conflict",
            ReconcileError::Repository(_) => "repository",
        }
    }
}

/// Result of a per-series check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReconcileOutcome {
    /// Markers matched; no side effects were performed.
    Unchanged,
    /// A change was detected and the swap completed; the new title and
    /// marker are persisted.
    Updated { title: String, update_marker: String },
}

/// Result of tracking a new series.
#[derive(Debug)]
pub struct TrackResult {
    /// The created record, refreshed after the initial swap when it
    /// succeeded.
    pub series: Series,
    /// Error from the initial payload swap, if any. The series stays
    /// tracked either way; the next pass retries.
    pub initial_sync_error: Option<ReconcileError>,
}

/// Summary of one batch reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Series for which a reconcile was attempted.
    pub attempted: u32,
    /// Series that got a new payload swapped in.
    pub updated: u32,
    /// Series whose reconcile failed.
    pub failed: u32,
}

/// A finished pass with its completion time, kept for the status API.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PassSummary {
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: BatchReport,
}

/// Engine status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub scheduler_running: bool,
    pub tracked_series: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<PassSummary>,
}
