//! Notification sink.
//!
//! Fire-and-forget user notifications for detected updates. Delivery
//! failures are logged and never propagate into the reconciliation result.

mod log;
mod telegram;
mod types;

pub use log::LogNotifier;
pub use telegram::TelegramNotifier;
pub use types::*;
