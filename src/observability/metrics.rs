//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, rejections, limiter size)
//! - Install the Prometheus recorder and render the exposition text
//!
//! # Metrics
//! - `symbio_http_requests_total` (counter): requests by method, status
//! - `symbio_http_request_duration_seconds` (histogram): latency distribution
//! - `symbio_rate_limited_total` (counter): 429s by limiter
//! - `symbio_origin_rejected_total` (counter): origin gate rejections
//! - `symbio_rate_limit_entries` (gauge): tracked clients per limiter
//! - `symbio_storage_up` (gauge): 1=reachable, 0=unreachable
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed (tests, disabled config)
//! - Histogram buckets tuned for typical API latencies

use std::time::Duration;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global Prometheus recorder. `None` when one is already set.
pub fn install_recorder() -> Option<PrometheusHandle> {
    let installed = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("symbio_http_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .and_then(PrometheusBuilder::install_recorder);

    match installed {
        Ok(handle) => {
            tracing::info!("Prometheus recorder installed");
            Some(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        "symbio_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("symbio_http_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_rate_limited(limiter: &'static str) {
    counter!("symbio_rate_limited_total", "limiter" => limiter).increment(1);
}

pub fn record_origin_rejected() {
    counter!("symbio_origin_rejected_total").increment(1);
}

pub fn record_limiter_entries(limiter: &'static str, entries: usize) {
    gauge!("symbio_rate_limit_entries", "limiter" => limiter).set(entries as f64);
}

pub fn record_storage_up(up: bool) {
    gauge!("symbio_storage_up").set(if up { 1.0 } else { 0.0 });
}
