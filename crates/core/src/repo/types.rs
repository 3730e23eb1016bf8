//! Types for series storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Series not found: {0}")]
    NotFound(u32),

    #[error("Series already tracked for url: {0}")]
    DuplicateUrl(String),

    /// Two concurrent inserts raced for the same id. Retried with a fresh
    /// allocation by the caller, never silently dropped.
    #[error("Id allocation conflict on id {0}")]
    AllocationConflict(u32),

    #[error("Database error: {0}")]
    Database(String),
}

/// A tracked external release page and its synchronization state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    /// Positive integer id, stable for the lifetime of the series and used
    /// as the torrent tag suffix. Reused only after deletion.
    pub id: u32,
    /// Canonical page address, unique across all series.
    pub url: String,
    /// Human-readable name, refreshed on every detected change.
    pub title: String,
    /// Last-seen opaque revision token. Empty until the first successful
    /// swap; the engine compares it with exact string equality only.
    pub update_marker: String,
    /// User who added the series. Provenance, not used by the engine.
    pub added_by: i64,
    /// When the series was added. Provenance, not used by the engine.
    pub added_at: DateTime<Utc>,
}

/// Trait for series storage backends.
pub trait SeriesRepository: Send + Sync {
    /// Insert a new series, allocating the smallest free id.
    fn insert(
        &self,
        url: &str,
        title: &str,
        update_marker: &str,
        added_by: i64,
    ) -> Result<Series, RepoError>;

    /// Update title and/or marker of an existing series.
    fn update(
        &self,
        id: u32,
        title: Option<&str>,
        update_marker: Option<&str>,
    ) -> Result<(), RepoError>;

    /// Delete a series record, freeing its id for reuse.
    fn delete(&self, id: u32) -> Result<(), RepoError>;

    /// Get a series by id.
    fn get(&self, id: u32) -> Result<Option<Series>, RepoError>;

    /// List all tracked series in ascending id order.
    fn list(&self) -> Result<Vec<Series>, RepoError>;

    /// Check whether a series is already tracked for the given url.
    fn exists_by_url(&self, url: &str) -> Result<bool, RepoError>;
}
