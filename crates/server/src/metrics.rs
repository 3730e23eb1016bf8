//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the retrack server:
//! - HTTP request metrics (latency, counts, errors)
//! - Authentication failures
//! - Engine metrics re-exported from the core registry

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "retrack_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("retrack_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "retrack_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "retrack_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Whether the background scheduler is running (1) or stopped (0).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "retrack_scheduler_running",
        "Whether the reconciliation scheduler is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Number of tracked series (collected dynamically).
pub static TRACKED_SERIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("retrack_tracked_series", "Number of tracked series").unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(TRACKED_SERIES.clone())).unwrap();

    // Engine and remote-service metrics
    for metric in retrack_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Update gauges that reflect current application state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.engine().status().await;
    SCHEDULER_RUNNING.set(if status.scheduler_running { 1 } else { 0 });
    TRACKED_SERIES.set(status.tracked_series as i64);
}

/// Normalize a path for metric labels (replace numeric ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
