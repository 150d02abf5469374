//! Response instrumentation.
//!
//! # Responsibilities
//! - Measure request entry to response head with a monotonic clock
//! - Expose it as `X-Response-Time: 12.34ms`
//! - Record request count and latency metrics
//!
//! # Design Decisions
//! - Outermost layer, so rejections from inner stages are timed too

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::observability::metrics;

pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Milliseconds with two decimals and an `ms` suffix.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}ms", elapsed.as_secs_f64() * 1e3)
}

pub async fn response_time_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;

    let elapsed = start.elapsed();
    let formatted = format_elapsed(elapsed);
    if let Ok(value) = HeaderValue::from_str(&formatted) {
        response.headers_mut().insert(X_RESPONSE_TIME, value);
    }

    let status = response.status().as_u16();
    metrics::record_request(method.as_str(), status, elapsed);
    tracing::debug!(method = %method, uri = %uri, status, elapsed = %formatted, "Request completed");

    response
}
