//! Fixed-window rate limiting with a bank of named limiters.
//!
//! # Responsibilities
//! - Derive the client key (authenticated identity or peer address)
//! - Count requests per client in fixed windows, reject past the ceiling
//! - Emit `RateLimit-*` headers and the configured 429 payload
//! - Give back the slot of successful requests on limiters that ask for it
//! - Sweep idle entries so memory stays bounded
//!
//! # Design Decisions
//! - Fixed window, not sliding: up to 2x max can pass across a boundary
//! - Read-reset-compare-increment runs under the DashMap entry lock, so
//!   concurrent requests from one client cannot both pass the ceiling
//! - Limiters are independent; each owns its own map

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::{LimiterConfig, RateLimitsConfig, RejectionPayload};
use crate::observability::metrics;
use crate::security::SecurityError;

pub const RATELIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Identity attached by an upstream authentication layer.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub String);

/// Bucket identity for rate limiting.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn user(id: &str) -> Self {
        Self(format!("user:{id}"))
    }

    pub fn ip(addr: IpAddr) -> Self {
        Self(format!("ip:{addr}"))
    }

    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    /// Authenticated identity first, then the peer address.
    pub fn from_request(request: &Request<Body>, trust_forwarded_for: bool) -> Self {
        if let Some(user) = request.extensions().get::<AuthenticatedUser>() {
            return Self::user(&user.0);
        }

        if trust_forwarded_for {
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
            if let Some(ip) = forwarded {
                return Self::ip(ip);
            }
        }

        match request.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Self::ip(addr.ip()),
            None => Self::unknown(),
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter for one client in one limiter.
#[derive(Debug, Clone, Copy)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        remaining: u32,
        reset_after: Duration,
        window_start: Instant,
    },
    Rejected {
        reset_after: Duration,
    },
}

/// A single named fixed-window limiter.
pub struct FixedWindowLimiter {
    name: &'static str,
    max: u32,
    window: Duration,
    skip_successful_requests: bool,
    rejection: RejectionPayload,
    entries: DashMap<ClientKey, WindowState>,
}

impl FixedWindowLimiter {
    pub fn new(name: &'static str, config: &LimiterConfig) -> Self {
        Self {
            name,
            max: config.max,
            window: Duration::from_secs(config.window_secs),
            skip_successful_requests: config.skip_successful_requests,
            rejection: config.rejection.clone(),
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: &ClientKey) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`.
    pub fn check_at(&self, key: &ClientKey, now: Instant) -> Decision {
        let mut state = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| WindowState {
                count: 0,
                window_start: now,
            });

        if now >= state.window_start + self.window {
            state.count = 0;
            state.window_start = now;
        }

        let reset_after = (state.window_start + self.window).saturating_duration_since(now);
        if state.count >= self.max {
            return Decision::Rejected { reset_after };
        }

        state.count += 1;
        Decision::Allowed {
            remaining: self.max - state.count,
            reset_after,
            window_start: state.window_start,
        }
    }

    /// Undo one count, unless the window it was taken in has since rolled.
    pub fn refund(&self, key: &ClientKey, window_start: Instant) {
        if let Some(mut state) = self.entries.get_mut(key) {
            if state.window_start == window_start {
                state.count = state.count.saturating_sub(1);
            }
        }
    }

    /// Current count for `key`, if tracked.
    pub fn count(&self, key: &ClientKey) -> Option<u32> {
        self.entries.get(key).map(|s| s.count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose window ended more than `grace` before `now`.
    pub fn evict_expired_at(&self, now: Instant, grace: Duration) -> usize {
        let before = self.entries.len();
        let horizon = self.window + grace;
        self.entries.retain(|_, state| now < state.window_start + horizon);
        before.saturating_sub(self.entries.len())
    }

    fn rejection(&self, reset_after: Duration) -> SecurityError {
        SecurityError::RateLimitExceeded {
            limiter: self.name,
            limit: self.max,
            window_secs: self.window.as_secs(),
            reset_after_secs: ceil_secs(reset_after),
            payload: self.rejection.clone(),
        }
    }
}

impl fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("name", &self.name)
            .field("max", &self.max)
            .field("window", &self.window)
            .field("skip_successful_requests", &self.skip_successful_requests)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Which limiter a route group is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterKind {
    General,
    Auth,
    Ai,
    Upload,
    Report,
}

/// The five named limiters plus sweep settings.
#[derive(Debug)]
pub struct LimiterBank {
    general: Arc<FixedWindowLimiter>,
    auth: Arc<FixedWindowLimiter>,
    ai: Arc<FixedWindowLimiter>,
    upload: Arc<FixedWindowLimiter>,
    report: Arc<FixedWindowLimiter>,
    enabled: bool,
    trust_forwarded_for: bool,
    sweep_interval: Duration,
    eviction_grace: Duration,
}

impl LimiterBank {
    pub fn from_config(config: &RateLimitsConfig) -> Self {
        Self {
            general: Arc::new(FixedWindowLimiter::new("general", &config.general)),
            auth: Arc::new(FixedWindowLimiter::new("auth", &config.auth)),
            ai: Arc::new(FixedWindowLimiter::new("ai", &config.ai)),
            upload: Arc::new(FixedWindowLimiter::new("upload", &config.upload)),
            report: Arc::new(FixedWindowLimiter::new("report", &config.report)),
            enabled: config.enabled,
            trust_forwarded_for: config.trust_forwarded_for,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            eviction_grace: Duration::from_secs(config.eviction_grace_secs),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, kind: LimiterKind) -> &Arc<FixedWindowLimiter> {
        match kind {
            LimiterKind::General => &self.general,
            LimiterKind::Auth => &self.auth,
            LimiterKind::Ai => &self.ai,
            LimiterKind::Upload => &self.upload,
            LimiterKind::Report => &self.report,
        }
    }

    /// Middleware state for one limiter.
    pub fn guard(&self, kind: LimiterKind) -> LimiterGuard {
        LimiterGuard {
            limiter: Arc::clone(self.get(kind)),
            trust_forwarded_for: self.trust_forwarded_for,
        }
    }

    fn all(&self) -> [&Arc<FixedWindowLimiter>; 5] {
        [&self.general, &self.auth, &self.ai, &self.upload, &self.report]
    }

    /// Evict idle entries from every limiter.
    pub fn sweep_at(&self, now: Instant) -> usize {
        self.all()
            .iter()
            .map(|limiter| {
                let evicted = limiter.evict_expired_at(now, self.eviction_grace);
                metrics::record_limiter_entries(limiter.name(), limiter.len());
                evicted
            })
            .sum()
    }

    /// Periodic eviction until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.sweep_interval.as_secs(),
            grace_secs = self.eviction_grace.as_secs(),
            "Rate limit sweeper starting"
        );

        let mut ticker = time::interval(self.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep_at(Instant::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, "Evicted idle rate limit entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// State handed to [`rate_limit_middleware`].
#[derive(Clone, Debug)]
pub struct LimiterGuard {
    limiter: Arc<FixedWindowLimiter>,
    trust_forwarded_for: bool,
}

/// Middleware enforcing one limiter.
pub async fn rate_limit_middleware(
    State(guard): State<LimiterGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limiter = &guard.limiter;
    let key = ClientKey::from_request(&request, guard.trust_forwarded_for);

    match limiter.check(&key) {
        Decision::Rejected { reset_after } => {
            tracing::warn!(
                client = %key,
                limiter = limiter.name(),
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(limiter.name());
            limiter.rejection(reset_after).into_response()
        }
        Decision::Allowed {
            remaining,
            reset_after,
            window_start,
        } => {
            let mut response = next.run(request).await;

            if limiter.skip_successful_requests && response.status().as_u16() < 400 {
                limiter.refund(&key, window_start);
            }

            // The innermost limiter wrote first and is the most specific.
            if !response.headers().contains_key(RATELIMIT_LIMIT) {
                insert_rate_limit_headers(
                    response.headers_mut(),
                    limiter.max,
                    limiter.window.as_secs(),
                    remaining,
                    ceil_secs(reset_after),
                );
            }
            response
        }
    }
}

pub(crate) fn insert_rate_limit_headers(
    headers: &mut HeaderMap,
    limit: u32,
    window_secs: u64,
    remaining: u32,
    reset_secs: u64,
) {
    if let Ok(policy) = HeaderValue::from_str(&format!("{limit};w={window_secs}")) {
        headers.insert(RATELIMIT_POLICY, policy);
    }
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs));
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::connect_info::MockConnectInfo,
        http::StatusCode,
        middleware,
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    fn limiter(max: u32, window_secs: u64, skip_successful: bool) -> FixedWindowLimiter {
        let mut config = RateLimitsConfig::default().general;
        config.max = max;
        config.window_secs = window_secs;
        config.skip_successful_requests = skip_successful;
        FixedWindowLimiter::new("test", &config)
    }

    fn key() -> ClientKey {
        ClientKey::ip("10.0.0.7".parse().unwrap())
    }

    #[test]
    fn test_rejects_request_past_max() {
        let limiter = limiter(5, 60, false);
        let now = Instant::now();

        for i in 0..5 {
            match limiter.check_at(&key(), now) {
                Decision::Allowed { remaining, .. } => assert_eq!(remaining, 4 - i),
                other => panic!("request {i} should pass, got {other:?}"),
            }
        }
        assert!(matches!(limiter.check_at(&key(), now), Decision::Rejected { .. }));
        // Rejections do not count.
        assert_eq!(limiter.count(&key()), Some(5));
    }

    #[test]
    fn test_window_reset_starts_from_one() {
        let limiter = limiter(3, 60, false);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at(&key(), start);
        }
        assert!(matches!(
            limiter.check_at(&key(), start + Duration::from_secs(59)),
            Decision::Rejected { .. }
        ));

        let next_window = start + Duration::from_secs(60);
        match limiter.check_at(&key(), next_window) {
            Decision::Allowed { remaining, window_start, .. } => {
                assert_eq!(remaining, 2);
                assert_eq!(window_start, next_window);
            }
            other => panic!("expected fresh window, got {other:?}"),
        }
        assert_eq!(limiter.count(&key()), Some(1));
    }

    #[test]
    fn test_burst_across_boundary_is_admitted() {
        let limiter = limiter(2, 60, false);
        let start = Instant::now();
        limiter.check_at(&key(), start);
        let late = start + Duration::from_millis(59_900);
        assert!(matches!(limiter.check_at(&key(), late), Decision::Allowed { .. }));
        let early = start + Duration::from_secs(60);
        assert!(matches!(limiter.check_at(&key(), early), Decision::Allowed { .. }));
        assert!(matches!(limiter.check_at(&key(), early), Decision::Allowed { .. }));
    }

    #[test]
    fn test_reset_after_counts_down() {
        let limiter = limiter(1, 60, false);
        let start = Instant::now();
        limiter.check_at(&key(), start);
        match limiter.check_at(&key(), start + Duration::from_millis(15_500)) {
            Decision::Rejected { reset_after } => {
                assert_eq!(reset_after, Duration::from_millis(44_500));
                assert_eq!(ceil_secs(reset_after), 45);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1, 60, false);
        let now = Instant::now();
        let other = ClientKey::ip("10.0.0.8".parse().unwrap());
        assert!(matches!(limiter.check_at(&key(), now), Decision::Allowed { .. }));
        assert!(matches!(limiter.check_at(&other, now), Decision::Allowed { .. }));
        assert!(matches!(limiter.check_at(&key(), now), Decision::Rejected { .. }));
    }

    #[test]
    fn test_refund_ignores_rolled_window() {
        let limiter = limiter(3, 60, true);
        let start = Instant::now();
        let Decision::Allowed { window_start, .. } = limiter.check_at(&key(), start) else {
            panic!("first request must pass");
        };
        limiter.check_at(&key(), start + Duration::from_secs(61));
        limiter.refund(&key(), window_start);
        assert_eq!(limiter.count(&key()), Some(1));
    }

    #[test]
    fn test_eviction_after_grace() {
        let limiter = limiter(3, 60, false);
        let start = Instant::now();
        limiter.check_at(&key(), start);
        limiter.check_at(&ClientKey::unknown(), start + Duration::from_secs(100));

        let grace = Duration::from_secs(30);
        assert_eq!(limiter.evict_expired_at(start + Duration::from_secs(89), grace), 0);
        assert_eq!(limiter.evict_expired_at(start + Duration::from_secs(90), grace), 1);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.count(&key()), None);
    }

    #[test]
    fn test_bank_limiters_are_independent() {
        let bank = LimiterBank::from_config(&RateLimitsConfig::default());
        let now = Instant::now();
        for _ in 0..20 {
            bank.get(LimiterKind::Ai).check_at(&key(), now);
        }
        assert!(matches!(
            bank.get(LimiterKind::Ai).check_at(&key(), now),
            Decision::Rejected { .. }
        ));
        assert!(matches!(
            bank.get(LimiterKind::Report).check_at(&key(), now),
            Decision::Allowed { .. }
        ));
        assert_eq!(bank.get(LimiterKind::General).count(&key()), None);
        assert_eq!(bank.sweep_at(now + Duration::from_secs(3600)), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_requests_admit_exactly_max() {
        const N: u32 = 64;
        let limiter = Arc::new(limiter(N - 1, 60, false));

        let tasks: Vec<_> = (0..N)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check(&key()) })
            })
            .collect();

        let mut allowed = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Decision::Allowed { .. } => allowed += 1,
                Decision::Rejected { .. } => rejected += 1,
            }
        }
        assert_eq!(allowed, N - 1);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn test_client_key_prefers_identity() {
        let mut request = Request::get("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 4], 5000))));
        assert_eq!(ClientKey::from_request(&request, false).to_string(), "ip:192.168.1.4");

        request.extensions_mut().insert(AuthenticatedUser("uid-42".into()));
        assert_eq!(ClientKey::from_request(&request, false).to_string(), "user:uid-42");
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let request = Request::get("/")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(ClientKey::from_request(&request, false), ClientKey::unknown());
        assert_eq!(
            ClientKey::from_request(&request, true).to_string(),
            "ip:203.0.113.9"
        );
    }

    fn app(limiter: FixedWindowLimiter) -> Router {
        let guard = LimiterGuard {
            limiter: Arc::new(limiter),
            trust_forwarded_for: false,
        };
        Router::new()
            .route("/api/items", get(|| async { "ok" }))
            .route(
                "/api/auth/login",
                post(|body: String| async move {
                    if body == "good" {
                        StatusCode::OK
                    } else {
                        StatusCode::UNAUTHORIZED
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(guard, rate_limit_middleware))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    #[tokio::test]
    async fn test_middleware_429_payload_and_headers() {
        let app = app(limiter(2, 60, false));

        for remaining in ["1", "0"] {
            let response = app
                .clone()
                .oneshot(Request::get("/api/items").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[RATELIMIT_LIMIT], "2");
            assert_eq!(response.headers()[RATELIMIT_REMAINING], remaining);
            assert_eq!(response.headers()[RATELIMIT_POLICY], "2;w=60");
        }

        let response = app
            .oneshot(Request::get("/api/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RATELIMIT_REMAINING], "0");
        assert!(response.headers().contains_key(RATELIMIT_RESET));
        assert!(response.headers().contains_key("retry-after"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Too many requests");
        assert_eq!(json["retryAfter"], 60);
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn test_successful_auth_does_not_count() {
        let app = app(limiter(3, 900, true));
        let login = |body: &'static str| {
            Request::post("/api/auth/login").body(Body::from(body)).unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(login("bad")).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = app.clone().oneshot(login("good")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Two failures counted, the success refunded: one slot left.
        let response = app.clone().oneshot(login("bad")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app.oneshot(login("good")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
