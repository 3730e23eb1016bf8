//! Tracker forum page fetcher implementation.
//!
//! Talks to a phpBB-style tracker forum: cookie-session login via
//! `login.php`, release pages under `viewtopic.php?t=<id>`, payloads under
//! `dl.php?t=<id>`. Session expiry is detected indirectly (missing page
//! elements, HTML where a torrent file was expected) and handled with a
//! single transparent re-login retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::FetcherConfig;
use crate::metrics::REMOTE_REQUEST_DURATION;

use super::extract::{extract_title, extract_topic_id, extract_update_marker, synthesized_marker};
use super::{FetchError, PageFetcher, PageSnapshot};

/// Forum page fetcher implementation.
pub struct ForumFetcher {
    client: Client,
    config: FetcherConfig,
    /// Whether we believe the session cookie is still valid.
    logged_in: Arc<RwLock<bool>>,
}

impl ForumFetcher {
    /// Create a new forum fetcher.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true);

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| FetchError::ConnectionFailed(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            logged_in: Arc::new(RwLock::new(false)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Login and mark the session valid.
    async fn login(&self) -> Result<(), FetchError> {
        let url = format!("{}/login.php", self.base_url());

        let params = [
            ("login_username", self.config.username.as_str()),
            ("login_password", self.config.password.as_str()),
            ("login", "login"),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        // The forum sets the session cookie on the login response itself.
        let has_session = response.cookies().any(|c| c.name().contains("session"));
        let status = response.status();

        if has_session {
            debug!("forum login successful");
            *self.logged_in.write().await = true;
            Ok(())
        } else {
            *self.logged_in.write().await = false;
            Err(FetchError::AuthenticationFailed(format!(
                "no session cookie after login (HTTP {})",
                status
            )))
        }
    }

    /// Ensure we have a session, logging in if needed.
    async fn ensure_logged_in(&self) -> Result<(), FetchError> {
        if *self.logged_in.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Fetch page HTML once.
    async fn get_page_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))
    }

    /// Fetch the payload once, checking that it is not an HTML error page.
    async fn get_payload(&self, topic_id: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let url = format!("{}/dl.php?t={}", self.base_url(), topic_id);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(
                self.config.download_timeout_secs as u64,
            ))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        // HTML here means the auth wall, not a torrent file.
        if content_type.contains("html") {
            return Ok(None);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Some(bytes.to_vec()))
    }
}

/// Map a reqwest error to a FetchError.
fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::ConnectionFailed(e.to_string())
    } else {
        FetchError::Http(e.to_string())
    }
}

#[async_trait]
impl PageFetcher for ForumFetcher {
    fn name(&self) -> &str {
        "forum"
    }

    async fn resolve_topic_id(&self, url: &str) -> Result<String, FetchError> {
        extract_topic_id(url).ok_or_else(|| FetchError::ResolveFailed(url.to_string()))
    }

    async fn fetch_page(&self, url: &str) -> Result<PageSnapshot, FetchError> {
        let topic_id =
            extract_topic_id(url).ok_or_else(|| FetchError::ResolveFailed(url.to_string()))?;

        let _timer = REMOTE_REQUEST_DURATION
            .with_label_values(&["forum", "fetch_page"])
            .start_timer();

        self.ensure_logged_in().await?;

        let mut html = self.get_page_html(url).await?;
        let mut title = extract_title(&html);

        // A missing title usually means the session expired and the forum
        // served the login page. Retry once after re-login.
        if title.is_none() {
            warn!(url = url, "page title missing, re-authenticating");
            *self.logged_in.write().await = false;
            self.login().await?;
            html = self.get_page_html(url).await?;
            title = extract_title(&html);
        }

        let title = title
            .ok_or_else(|| FetchError::ParseFailed(format!("no release title on page {}", url)))?;

        let update_marker = extract_update_marker(&html).unwrap_or_else(|| {
            debug!(url = url, "page has no post-time, synthesizing marker");
            synthesized_marker()
        });

        Ok(PageSnapshot {
            title,
            update_marker,
            topic_id,
        })
    }

    async fn download_payload(&self, topic_id: &str) -> Result<Vec<u8>, FetchError> {
        let _timer = REMOTE_REQUEST_DURATION
            .with_label_values(&["forum", "download"])
            .start_timer();

        self.ensure_logged_in().await?;

        if let Some(bytes) = self.get_payload(topic_id).await? {
            return Ok(bytes);
        }

        warn!(
            topic_id = topic_id,
            "payload endpoint returned HTML, re-authenticating"
        );
        *self.logged_in.write().await = false;
        self.login().await?;

        match self.get_payload(topic_id).await? {
            Some(bytes) => Ok(bytes),
            None => Err(FetchError::InvalidPayload),
        }
    }
}
