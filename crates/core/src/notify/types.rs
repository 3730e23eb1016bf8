//! Types for the notification sink.

use async_trait::async_trait;

/// Trait for notification backends.
///
/// `notify` is fire-and-forget: implementations log failures and return
/// nothing, so a broken sink can never block or fail a reconciliation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Deliver a message to a user.
    async fn notify(&self, user_id: i64, text: &str);
}
