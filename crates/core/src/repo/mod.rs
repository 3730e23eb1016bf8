//! Series repository.
//!
//! Persistent storage for tracked series: one SQLite table keyed by the
//! integer id that doubles as the torrent tag suffix. Id allocation prefers
//! the smallest freed id and runs inside the insert transaction so two
//! concurrent adds cannot claim the same slot.

mod sqlite;
mod types;

pub use sqlite::SqliteSeriesRepository;
pub use types::*;
