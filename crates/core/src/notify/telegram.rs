//! Telegram notification backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use crate::config::TelegramConfig;

use super::Notifier;

const API_BASE: &str = "https://api.telegram.org";

/// Notifier delivering messages through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
    api_base: String,
}

impl TelegramNotifier {
    /// Create a new Telegram notifier.
    pub fn new(config: TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .unwrap_or_default();

        Self {
            client,
            config,
            api_base: API_BASE.to_string(),
        }
    }

    /// Override the API base URL (useful for testing).
    #[cfg(test)]
    fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.config.token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, user_id: i64, text: &str) {
        let body = json!({
            "chat_id": user_id,
            "text": text,
        });

        let result = self
            .client
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    user_id = user_id,
                    status = %response.status(),
                    "telegram notification rejected"
                );
            }
            Err(e) => {
                warn!(user_id = user_id, "telegram notification failed: {}", e);
            }
        }
    }
}
