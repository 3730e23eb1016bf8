//! Log-only notification backend.

use async_trait::async_trait;
use tracing::info;

use super::Notifier;

/// Notifier that writes messages to the log.
///
/// Used when no chat backend is configured; keeps the engine's notification
/// path uniform instead of branching on "notifications enabled".
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, user_id: i64, text: &str) {
        info!(user_id = user_id, "notification: {}", text);
    }
}
