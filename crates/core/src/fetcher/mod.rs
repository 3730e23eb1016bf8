//! Page fetcher abstraction.
//!
//! This module provides a `PageFetcher` trait for reading release pages from
//! a tracker forum: resolving a page URL to a topic id, extracting the title
//! and update marker, and downloading the release payload.

mod extract;
mod forum;
mod types;

pub use extract::{extract_topic_id, synthesized_marker};
pub use forum::ForumFetcher;
pub use types::*;
