//! Types for page fetcher operations.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while fetching a release page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL does not map to a known topic. Permanent until the user
    /// fixes the URL.
    #[error("URL does not resolve to a topic id: {0}")]
    ResolveFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The page was retrieved but the expected elements were missing.
    #[error("Failed to parse page: {0}")]
    ParseFailed(String),

    /// The payload endpoint returned HTML instead of a torrent file.
    #[error("Payload is not a torrent file")]
    InvalidPayload,

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Snapshot of a release page at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    /// Human-readable release title.
    pub title: String,
    /// Opaque revision token. Never empty for a successfully fetched page;
    /// compared upstream with exact string equality only.
    pub update_marker: String,
    /// External resource identifier used to download the payload.
    pub topic_id: String,
}

/// Trait for release page backends.
///
/// Implementations must guarantee that `fetch_page` never returns an empty
/// `update_marker` for a page that resolved successfully, and that the marker
/// is deterministic for an unchanged page across repeated fetches. Session
/// expiry is handled transparently (one retry after re-login) before a
/// failure is surfaced.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Resolve a page URL to its topic id without fetching the page.
    async fn resolve_topic_id(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch the current state of a release page.
    async fn fetch_page(&self, url: &str) -> Result<PageSnapshot, FetchError>;

    /// Download the release payload for a resolved topic id.
    async fn download_payload(&self, topic_id: &str) -> Result<Vec<u8>, FetchError>;
}
