//! Torrent store abstraction.
//!
//! This module provides a `TorrentStore` trait for the download client that
//! holds the actual torrent entries. Entries managed by the engine carry a
//! per-series tag (`id_<series id>`) and live under a fixed category that
//! partitions them from user-managed torrents.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentStore;
pub use types::*;
