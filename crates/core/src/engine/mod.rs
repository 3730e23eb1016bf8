//! Reconciliation engine.
//!
//! The part of the system that decides, for each tracked series, whether the
//! remote page changed, and performs the tag-scoped replace against the
//! torrent store so exactly one entry per series exists at any time.

mod reconciler;
mod runner;
mod types;

pub use reconciler::Reconciler;
pub use types::*;
