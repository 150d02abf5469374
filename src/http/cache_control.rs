//! Cache-Control policy for outbound responses.
//!
//! # Responsibilities
//! - Pick exactly one `Cache-Control` value per response
//! - Attach a weak `ETag` to every response it touches
//!
//! # Decision order
//! ```text
//! static asset extension  → public, max-age=31536000, immutable
//! not GET/HEAD            → no-store
//! duration == 0           → no-cache, no-store, must-revalidate
//! otherwise               → {private|public}, max-age=N[, stale-while-revalidate=M]
//! ```
//!
//! # Design Decisions
//! - Applied on the way out, after the handler produced its status
//! - 5xx API responses are never stored, whatever the policy says

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};

pub const STATIC_ASSET_EXTENSIONS: [&str; 12] = [
    "js", "css", "png", "jpg", "jpeg", "gif", "ico", "svg", "woff", "woff2", "ttf", "eot",
];

pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const NO_STORE: &str = "no-store";
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Per-route caching policy. Immutable once attached to a route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub duration_secs: u64,
    pub private: bool,
    pub stale_while_revalidate_secs: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            duration_secs: 0,
            private: true,
            stale_while_revalidate_secs: 0,
        }
    }
}

impl CachePolicy {
    /// `no-cache, no-store, must-revalidate` for reads.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn private(duration_secs: u64) -> Self {
        Self {
            duration_secs,
            ..Self::default()
        }
    }

    pub fn public(duration_secs: u64) -> Self {
        Self {
            duration_secs,
            private: false,
            ..Self::default()
        }
    }

    pub fn stale_while_revalidate(mut self, secs: u64) -> Self {
        self.stale_while_revalidate_secs = secs;
        self
    }
}

pub fn is_static_asset(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| STATIC_ASSET_EXTENSIONS.contains(&ext))
}

/// The single `Cache-Control` value for a request.
pub fn cache_control_value(method: &Method, path: &str, policy: &CachePolicy) -> String {
    if is_static_asset(path) {
        return IMMUTABLE.to_string();
    }
    if method != Method::GET && method != Method::HEAD {
        return NO_STORE.to_string();
    }
    if policy.duration_secs == 0 {
        return NO_CACHE.to_string();
    }

    let visibility = if policy.private { "private" } else { "public" };
    let mut value = format!("{visibility}, max-age={}", policy.duration_secs);
    if policy.stale_while_revalidate_secs > 0 {
        value.push_str(&format!(
            ", stale-while-revalidate={}",
            policy.stale_while_revalidate_secs
        ));
    }
    value
}

/// Weak validator derived from the current time: `W/"<ms base36>"`.
pub fn weak_etag(now: SystemTime) -> HeaderValue {
    let millis = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    let tag = format!("W/\"{}\"", to_base36(millis));
    HeaderValue::from_str(&tag).unwrap_or_else(|_| HeaderValue::from_static("W/\"0\""))
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Outbound Cache-Control + ETag.
pub async fn cache_control_middleware(
    State(policy): State<CachePolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let mut response = next.run(request).await;

    let value = if response.status().is_server_error() && !is_static_asset(&path) {
        NO_STORE.to_string()
    } else {
        cache_control_value(&method, &path, &policy)
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if !headers.contains_key(header::ETAG) {
        headers.insert(header::ETAG, weak_etag(SystemTime::now()));
    }
    response
}
