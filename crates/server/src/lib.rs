//! HTTP server for the retrack engine.

pub mod api;
pub mod metrics;
pub mod state;
