//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Reconciliation checks and batch passes
//! - Failures by error kind
//! - Remote service requests (tracker forum, torrent store)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts};

/// Per-series reconcile checks by outcome.
pub static RECONCILE_CHECKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "retrack_reconcile_checks_total",
            "Total per-series reconcile checks",
        ),
        &["outcome"], // "unchanged", "updated", "failed"
    )
    .unwrap()
});

/// Reconcile failures by error kind.
pub static RECONCILE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "retrack_reconcile_failures_total",
            "Total reconcile failures",
        ),
        &["kind"], // ReconcileError::kind()
    )
    .unwrap()
});

/// Duration of a full batch pass in seconds.
pub static PASS_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "retrack_pass_duration_seconds",
            "Duration of a full reconciliation pass",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
    )
    .unwrap()
});

/// Series tracked/untracked operations.
pub static SERIES_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "retrack_series_operations_total",
            "Track/untrack operations",
        ),
        &["operation", "result"], // operation: "track", "untrack"; result: "ok", "failed"
    )
    .unwrap()
});

/// Remote service request durations.
pub static REMOTE_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "retrack_remote_request_duration_seconds",
            "Duration of remote service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RECONCILE_CHECKS.clone()),
        Box::new(RECONCILE_FAILURES.clone()),
        Box::new(PASS_DURATION.clone()),
        Box::new(SERIES_OPERATIONS.clone()),
        Box::new(REMOTE_REQUEST_DURATION.clone()),
    ]
}
