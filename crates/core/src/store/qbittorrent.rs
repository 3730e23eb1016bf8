//! qBittorrent torrent store implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::metrics::REMOTE_REQUEST_DURATION;

use super::{StoreEntry, StoreError, TorrentStore};

/// qBittorrent Web API v2 store implementation.
pub struct QBittorrentStore {
    client: Client,
    config: StoreConfig,
    /// Whether the session cookie is believed valid (refreshed on 403).
    authenticated: Arc<RwLock<bool>>,
}

impl QBittorrentStore {
    /// Create a new qBittorrent store client.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            authenticated: Arc::new(RwLock::new(false)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store the session cookie.
    async fn login(&self) -> Result<(), StoreError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(StoreError::AuthenticationFailed(
                "invalid credentials".to_string(),
            ))
        } else {
            Err(StoreError::AuthenticationFailed(format!(
                "unexpected login response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), StoreError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Send a prepared request, re-authenticating once on 403.
    async fn send_with_reauth<F>(&self, make_request: F) -> Result<String, StoreError>
    where
        F: Fn(&Client) -> reqwest::RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let response = make_request(&self.client)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let response = if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            make_request(&self.client)
                .send()
                .await
                .map_err(map_reqwest_error)?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::ApiError(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| StoreError::ApiError(e.to_string()))
    }

    /// List raw torrent infos filtered by tag.
    async fn list_raw_by_tag(&self, tag: &str) -> Result<Vec<QbTorrentInfo>, StoreError> {
        let url = format!(
            "{}/api/v2/torrents/info?tag={}",
            self.base_url(),
            urlencoding::encode(tag)
        );

        let body = self.send_with_reauth(|c| c.get(&url)).await?;
        serde_json::from_str(&body)
            .map_err(|e| StoreError::ApiError(format!("failed to parse torrent list: {}", e)))
    }

    /// Delete torrents by hash list.
    async fn delete_hashes(&self, hashes: &[String], delete_files: bool) -> Result<(), StoreError> {
        if hashes.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/v2/torrents/delete", self.base_url());
        let joined = hashes.join("|");
        let delete_str = if delete_files { "true" } else { "false" };

        self.send_with_reauth(|c| {
            c.post(&url)
                .form(&[("hashes", joined.as_str()), ("deleteFiles", delete_str)])
        })
        .await?;

        Ok(())
    }
}

/// Map a reqwest error to a StoreError.
fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else if e.is_connect() {
        StoreError::ConnectionFailed(e.to_string())
    } else {
        StoreError::ApiError(e.to_string())
    }
}

/// Subset of the qBittorrent torrent info response the store needs.
#[derive(Debug, Deserialize)]
struct QbTorrentInfo {
    hash: String,
    name: String,
    progress: f64,
}

impl QbTorrentInfo {
    fn into_entry(self) -> StoreEntry {
        StoreEntry {
            hash: self.hash.to_lowercase(),
            name: self.name,
            progress: self.progress,
        }
    }
}

#[async_trait]
impl TorrentStore for QBittorrentStore {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add(&self, data: Vec<u8>, tag: &str) -> Result<(), StoreError> {
        let _timer = REMOTE_REQUEST_DURATION
            .with_label_values(&["store", "add"])
            .start_timer();

        let file_part = multipart::Part::bytes(data)
            .file_name("release.torrent")
            .mime_str("application/x-bittorrent")
            .map_err(|e| StoreError::InvalidTorrent(e.to_string()))?;

        let url = format!("{}/api/v2/torrents/add", self.base_url());

        // multipart::Form is not cloneable, so unlike the GET/form paths
        // there is no transparent re-auth retry here; a 403 surfaces as an
        // auth failure and the caller retries on the next pass.
        self.ensure_authenticated().await?;
        let form = multipart::Form::new()
            .part("torrents", file_part)
            .text("tags", tag.to_string())
            .text("category", self.config.category.clone());

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 403 {
            *self.authenticated.write().await = false;
            return Err(StoreError::AuthenticationFailed(
                "session rejected".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(StoreError::ApiError(format!("HTTP {}", status)));
        }

        let body = response.text().await.unwrap_or_default();
        if body.contains("Fails.") {
            return Err(StoreError::InvalidTorrent(
                "store rejected the torrent file".to_string(),
            ));
        }

        Ok(())
    }

    async fn delete_by_tag(&self, tag: &str, delete_files: bool) -> Result<(), StoreError> {
        let _timer = REMOTE_REQUEST_DURATION
            .with_label_values(&["store", "delete_by_tag"])
            .start_timer();

        let entries = self.list_raw_by_tag(tag).await?;
        let hashes: Vec<String> = entries.into_iter().map(|t| t.hash.to_lowercase()).collect();

        debug!(tag = tag, count = hashes.len(), "deleting entries by tag");
        self.delete_hashes(&hashes, delete_files).await
    }

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let entries = self.list_raw_by_tag(tag).await?;
        Ok(entries.into_iter().map(|t| t.into_entry()).collect())
    }

    async fn clear_category(&self) -> Result<(), StoreError> {
        let url = format!(
            "{}/api/v2/torrents/info?category={}",
            self.base_url(),
            urlencoding::encode(&self.config.category)
        );

        let body = self.send_with_reauth(|c| c.get(&url)).await?;
        let entries: Vec<QbTorrentInfo> = serde_json::from_str(&body)
            .map_err(|e| StoreError::ApiError(format!("failed to parse torrent list: {}", e)))?;

        let hashes: Vec<String> = entries.into_iter().map(|t| t.hash.to_lowercase()).collect();
        debug!(
            category = %self.config.category,
            count = hashes.len(),
            "clearing managed category"
        );
        self.delete_hashes(&hashes, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StoreConfig {
        StoreConfig {
            url: "http://localhost:8081/".to_string(),
            username: "admin".to_string(),
            password: "adminadmin".to_string(),
            category: "retrack".to_string(),
            delete_files: false,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let store = QBittorrentStore::new(test_config()).unwrap();
        assert_eq!(store.base_url(), "http://localhost:8081");
    }

    #[test]
    fn test_parse_torrent_info_response() {
        let json = r#"[
            {"hash": "ABC123", "name": "Some Release", "progress": 0.5, "state": "downloading"},
            {"hash": "def456", "name": "Other", "progress": 1.0}
        ]"#;
        let infos: Vec<QbTorrentInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(infos.len(), 2);

        let entry = infos.into_iter().next().unwrap().into_entry();
        assert_eq!(entry.hash, "abc123");
        assert_eq!(entry.name, "Some Release");
        assert!((entry.progress - 0.5).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_delete_hashes_empty_is_noop() {
        let store = QBittorrentStore::new(test_config()).unwrap();
        // No network call happens for an empty hash list.
        assert!(store.delete_hashes(&[], false).await.is_ok());
    }
}
