//! Origin gate: cross-origin admission before any other work.
//!
//! # Responsibilities
//! - Decide allow/reject for the request's declared `Origin`
//! - Reject disallowed origins before the body is read
//! - Build the CORS response-header layer from the same rules
//!
//! # Design Decisions
//! - Requests without an `Origin` header are admitted (curl, mobile apps,
//!   server-to-server callers); browsers always send one cross-origin
//! - Patterns are host suffixes, no regex in the hot path
//! - Rejections never say which rule failed

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, request::Parts, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;
use crate::observability::metrics;
use crate::security::SecurityError;

/// One entry of the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginRule {
    /// Full origin, compared byte for byte.
    Exact(String),
    /// Host suffix including the leading dot, e.g. `.vercel.app`.
    Suffix(String),
}

impl OriginRule {
    /// Parse a configured pattern. `*.vercel.app` becomes a suffix rule,
    /// anything else an exact rule.
    pub fn pattern(pattern: &str) -> Self {
        match pattern.strip_prefix('*') {
            Some(suffix) if suffix.starts_with('.') => OriginRule::Suffix(suffix.to_string()),
            _ => OriginRule::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, origin: &str) -> bool {
        match self {
            OriginRule::Exact(expected) => origin == expected,
            OriginRule::Suffix(suffix) => origin.ends_with(suffix.as_str()),
        }
    }
}

/// Static, read-only allow-list built once at startup.
#[derive(Debug, Clone)]
pub struct OriginGate {
    exact: Vec<String>,
    patterns: Vec<OriginRule>,
}

impl OriginGate {
    pub fn new(exact: Vec<String>, patterns: Vec<OriginRule>) -> Self {
        Self { exact, patterns }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        let exact = config
            .allowed_origins
            .iter()
            .chain(config.frontend_url.iter())
            .chain(config.additional_origin.iter())
            .map(|o| o.trim_end_matches('/').to_string())
            .collect();
        let patterns = config
            .origin_patterns
            .iter()
            .map(|p| OriginRule::pattern(p))
            .collect();
        Self::new(exact, patterns)
    }

    /// Admission decision for a declared origin.
    pub fn check(&self, origin: Option<&str>) -> Result<(), SecurityError> {
        let origin = match origin {
            None => return Ok(()),
            Some(o) if o.is_empty() => return Ok(()),
            Some(o) => o,
        };

        if self.exact.iter().any(|e| e == origin) {
            return Ok(());
        }
        if self.patterns.iter().any(|p| p.matches(origin)) {
            return Ok(());
        }
        Err(SecurityError::OriginRejected)
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        self.check(origin).is_ok()
    }

    /// CORS response headers for admitted origins, echoing the origin back.
    pub fn cors_layer(gate: Arc<Self>, allow_credentials: bool) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().map(|o| gate.allows(Some(o))).unwrap_or(false)
            }))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request());
        layer.allow_credentials(allow_credentials)
    }
}

/// Middleware rejecting disallowed origins with 403.
pub async fn origin_gate_middleware(
    State(gate): State<Arc<OriginGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).map(|v| v.to_str());
    let decision = match origin {
        None => gate.check(None),
        Some(Ok(o)) => gate.check(Some(o)),
        // Non-ASCII origin header: never on the allow-list.
        Some(Err(_)) => Err(SecurityError::OriginRejected),
    };

    match decision {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Origin rejected"
            );
            metrics::record_origin_rejected();
            err.into_response()
        }
    }
}
