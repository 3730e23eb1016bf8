//! Core library for retrack, a release page tracker.
//!
//! A tracked series points at a forum release page. The engine periodically
//! re-fetches each page, compares an opaque update marker by exact string
//! equality, and on change replaces the tag-scoped entry in the torrent
//! client so exactly one entry per series exists at any time.

pub mod config;
pub mod engine;
pub mod fetcher;
pub mod metrics;
pub mod notify;
pub mod repo;
pub mod store;
pub mod testing;

pub use config::{load_config, validate_config, Config, ConfigError, SanitizedConfig};
pub use engine::{
    series_tag, BatchReport, EngineStatus, PassSummary, ReconcileError, ReconcileOutcome,
    Reconciler, TrackResult,
};
pub use fetcher::{FetchError, ForumFetcher, PageFetcher, PageSnapshot};
pub use notify::{LogNotifier, Notifier, TelegramNotifier};
pub use repo::{RepoError, Series, SeriesRepository, SqliteSeriesRepository};
pub use store::{QBittorrentStore, StoreEntry, StoreError, TorrentStore};
