//! Mock page fetcher for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::fetcher::{extract_topic_id, FetchError, PageFetcher, PageSnapshot};

/// Mock implementation of the PageFetcher trait.
///
/// Pages are configured per url; payloads per topic id. Failures are
/// injected one-shot: the next matching call fails, subsequent calls
/// succeed again.
#[derive(Default)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, PageSnapshot>>>,
    payloads: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    next_fetch_error: Arc<RwLock<Option<FetchError>>>,
    next_download_error: Arc<RwLock<Option<FetchError>>>,
    fetch_count: Arc<RwLock<u32>>,
    download_count: Arc<RwLock<u32>>,
}

impl MockFetcher {
    /// Create a new mock fetcher with no pages configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the page behind a url. The topic id is derived from the
    /// url's `t` parameter; the payload defaults to a small blob.
    pub async fn set_page(&self, url: &str, title: &str, update_marker: &str) {
        let topic_id = extract_topic_id(url).expect("mock page url must carry a t parameter");
        self.payloads
            .write()
            .await
            .entry(topic_id.clone())
            .or_insert_with(|| format!("payload-{}", topic_id).into_bytes());
        self.pages.write().await.insert(
            url.to_string(),
            PageSnapshot {
                title: title.to_string(),
                update_marker: update_marker.to_string(),
                topic_id,
            },
        );
    }

    /// Set the payload bytes for a topic id.
    pub async fn set_payload(&self, topic_id: &str, data: Vec<u8>) {
        self.payloads
            .write()
            .await
            .insert(topic_id.to_string(), data);
    }

    /// Fail the next `fetch_page` call with the given error.
    pub async fn fail_next_fetch(&self, error: FetchError) {
        *self.next_fetch_error.write().await = Some(error);
    }

    /// Fail the next `download_payload` call with the given error.
    pub async fn fail_next_download(&self, error: FetchError) {
        *self.next_download_error.write().await = Some(error);
    }

    /// Number of `fetch_page` calls made.
    pub async fn fetch_count(&self) -> u32 {
        *self.fetch_count.read().await
    }

    /// Number of `download_payload` calls made.
    pub async fn download_count(&self) -> u32 {
        *self.download_count.read().await
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve_topic_id(&self, url: &str) -> Result<String, FetchError> {
        extract_topic_id(url).ok_or_else(|| FetchError::ResolveFailed(url.to_string()))
    }

    async fn fetch_page(&self, url: &str) -> Result<PageSnapshot, FetchError> {
        *self.fetch_count.write().await += 1;

        if let Some(error) = self.next_fetch_error.write().await.take() {
            return Err(error);
        }

        if extract_topic_id(url).is_none() {
            return Err(FetchError::ResolveFailed(url.to_string()));
        }

        self.pages
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Http(format!("no mock page for {}", url)))
    }

    async fn download_payload(&self, topic_id: &str) -> Result<Vec<u8>, FetchError> {
        *self.download_count.write().await += 1;

        if let Some(error) = self.next_download_error.write().await.take() {
            return Err(error);
        }

        self.payloads
            .read()
            .await
            .get(topic_id)
            .cloned()
            .ok_or(FetchError::InvalidPayload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_page_round_trip() {
        let fetcher = MockFetcher::new();
        fetcher
            .set_page("https://t.example/viewtopic.php?t=55", "Title", "rev-A")
            .await;

        let snapshot = fetcher
            .fetch_page("https://t.example/viewtopic.php?t=55")
            .await
            .unwrap();
        assert_eq!(snapshot.title, "Title");
        assert_eq!(snapshot.update_marker, "rev-A");
        assert_eq!(snapshot.topic_id, "55");

        let payload = fetcher.download_payload("55").await.unwrap();
        assert_eq!(payload, b"payload-55");
    }

    #[tokio::test]
    async fn test_next_error_is_one_shot() {
        let fetcher = MockFetcher::new();
        fetcher
            .set_page("https://t.example/viewtopic.php?t=1", "T", "m")
            .await;
        fetcher.fail_next_fetch(FetchError::Timeout).await;

        assert!(matches!(
            fetcher.fetch_page("https://t.example/viewtopic.php?t=1").await,
            Err(FetchError::Timeout)
        ));
        assert!(fetcher
            .fetch_page("https://t.example/viewtopic.php?t=1")
            .await
            .is_ok());
        assert_eq!(fetcher.fetch_count().await, 2);
    }

    #[tokio::test]
    async fn test_unresolvable_url_fails() {
        let fetcher = MockFetcher::new();
        assert!(matches!(
            fetcher.fetch_page("https://t.example/index.php").await,
            Err(FetchError::ResolveFailed(_))
        ));
    }
}
