//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages and background tasks emit:
//!     → logging.rs (tracing events; per-request spans from TraceLayer)
//!     → metrics.rs (request counts, latency, 403/429 rejections, limiter size)
//!
//! Read back by:
//!     → stdout (fmt subscriber)
//!     → GET /api/health/metrics (Prometheus text)
//! ```
//!
//! # Design Decisions
//! - `x-request-id` is set before the trace span opens, so every log line of
//!   a request can be correlated
//! - Without an installed recorder the `record_*` calls do nothing
//!   (tests, `metrics_enabled = false`)

pub mod logging;
pub mod metrics;
