//! Types for torrent store operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during torrent store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

/// A store entry as seen through a tag lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
}

/// Trait for torrent store backends.
///
/// All operations are tag- or category-scoped; the engine never addresses
/// entries by hash. `delete_by_tag` on a tag with no entries is a no-op
/// success, which is what makes the replace operation idempotent.
#[async_trait]
pub trait TorrentStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Submit a torrent file under the given tag.
    async fn add(&self, data: Vec<u8>, tag: &str) -> Result<(), StoreError>;

    /// Remove every entry carrying the given tag.
    /// If `delete_files` is true, also delete downloaded files.
    async fn delete_by_tag(&self, tag: &str, delete_files: bool) -> Result<(), StoreError>;

    /// List entries carrying the given tag.
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<StoreEntry>, StoreError>;

    /// Remove every entry in the managed category, keeping files on disk.
    async fn clear_category(&self) -> Result<(), StoreError>;
}
