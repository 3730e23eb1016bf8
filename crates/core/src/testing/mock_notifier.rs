//! Mock notifier for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::notify::Notifier;

/// Mock implementation of the Notifier trait that records every message.
#[derive(Default)]
pub struct MockNotifier {
    messages: Arc<RwLock<Vec<(i64, String)>>>,
}

impl MockNotifier {
    /// Create a new mock notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// All delivered messages as (user_id, text) pairs.
    pub async fn messages(&self) -> Vec<(i64, String)> {
        self.messages.read().await.clone()
    }

    /// Messages delivered to one user.
    pub async fn messages_for(&self, user_id: i64) -> Vec<String> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, user_id: i64, text: &str) {
        self.messages
            .write()
            .await
            .push((user_id, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_are_recorded() {
        let notifier = MockNotifier::new();
        notifier.notify(1, "hello").await;
        notifier.notify(2, "other").await;
        notifier.notify(1, "again").await;

        assert_eq!(notifier.messages().await.len(), 3);
        assert_eq!(notifier.messages_for(1).await, vec!["hello", "again"]);
    }
}
