//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared application state once
//! - Compose the middleware pipeline around the route groups
//! - Serve on a bound listener until the shutdown broadcast fires
//! - Start the background tasks (limiter sweeper, storage monitor)
//!
//! # Pipeline (outermost first)
//! ```text
//! request id → trace span → response time → security headers
//!     → origin gate → CORS headers → timeout → body limit → compression
//!     → /api: general limiter → group limiter → Cache-Control → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer, services::ServeDir,
    timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::health::{health_router, HealthState, StorageHealth, StorageMonitor};
use crate::http::cache_control::{cache_control_middleware, CachePolicy};
use crate::http::request::with_request_id;
use crate::http::response::response_time_middleware;
use crate::http::routes::ApiRoutes;
use crate::lifecycle::Shutdown;
use crate::security::headers::with_security_headers;
use crate::security::origin::origin_gate_middleware;
use crate::security::{LimiterBank, OriginGate};

/// Process-wide state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub origin_gate: Arc<OriginGate>,
    pub limiters: Arc<LimiterBank>,
    pub storage: Arc<StorageHealth>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: GatewayConfig, metrics: Option<PrometheusHandle>) -> Self {
        let origin_gate = Arc::new(OriginGate::from_config(&config.cors));
        let limiters = Arc::new(LimiterBank::from_config(&config.rate_limits));
        let storage = Arc::new(StorageHealth::new(
            config.storage.mode.clone(),
            config.storage.address.is_some(),
        ));

        Self {
            config: Arc::new(config),
            origin_gate,
            limiters,
            storage,
            metrics,
        }
    }
}

/// The API gateway server.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server for `config` serving the collaborator routes in `api`.
    pub fn new(config: GatewayConfig, api: ApiRoutes, metrics: Option<PrometheusHandle>) -> Self {
        let state = AppState::new(config, metrics);
        let router = Self::build_router(&state, api);
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: &AppState, api: ApiRoutes) -> Router {
        let config = &state.config;

        let health = health_router(HealthState {
            storage: Arc::clone(&state.storage),
            metrics: state.metrics.clone(),
        });

        let mut router = Router::new()
            .route("/", get(banner).with_state(Arc::clone(config)))
            .merge(api.into_router(&state.limiters, health));

        if let Some(dir) = &config.static_files.dir {
            tracing::info!(dir = %dir, mount = %config.static_files.mount, "Serving static files");
            let assets = Router::new()
                .fallback_service(ServeDir::new(dir))
                .layer(middleware::from_fn_with_state(
                    CachePolicy::default(),
                    cache_control_middleware,
                ));
            router = router.nest_service(&config.static_files.mount, assets);
        }

        if config.security.compression {
            router = router.layer(CompressionLayer::new());
        }

        let router = router
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(DefaultBodyLimit::disable())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(OriginGate::cors_layer(
                Arc::clone(&state.origin_gate),
                config.cors.allow_credentials,
            ))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state.origin_gate),
                origin_gate_middleware,
            ));

        let router = if config.security.enable_headers {
            with_security_headers(router)
        } else {
            router
        };

        let router = router
            .layer(middleware::from_fn(response_time_middleware))
            .layer(TraceLayer::new_for_http());

        with_request_id(router)
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if self.state.limiters.enabled() {
            let limiters = Arc::clone(&self.state.limiters);
            tokio::spawn(limiters.run_sweeper(shutdown.subscribe()));
        }

        if let Some(monitor) =
            StorageMonitor::new(Arc::clone(&self.state.storage), &self.state.config.storage)
        {
            tokio::spawn(monitor.run(shutdown.subscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let mut signal = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// `GET /`: service banner.
async fn banner(State(config): State<Arc<GatewayConfig>>) -> Json<Value> {
    Json(json!({
        "message": "Symbio-NLM Backend API",
        "version": env!("CARGO_PKG_VERSION"),
        "storageMode": config.storage.mode,
        "endpoints": {
            "health": "/api/health",
            "sequences": "/api/sequences",
            "auth": "/api/auth",
            "ai": "/api/ai",
            "storage": "/api/storage",
            "reports": "/api/reports",
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::connect_info::MockConnectInfo,
        http::{header, Request, StatusCode},
        routing::post,
    };
    use tower::ServiceExt;

    fn server(config: GatewayConfig) -> Router {
        let api = ApiRoutes::new()
            .general(
                Router::new().route("/sequences-count", get(|| async { "3" })),
                CachePolicy::private(60),
            )
            .auth(
                Router::new().route("/login", post(|| async { StatusCode::UNAUTHORIZED })),
                CachePolicy::none(),
            );
        HttpServer::new(config, api, None)
            .router()
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))))
    }

    #[tokio::test]
    async fn test_banner() {
        let response = server(GatewayConfig::default())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-response-time"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["storageMode"], "sqlite");
        assert_eq!(json["endpoints"]["health"], "/api/health");
    }

    #[tokio::test]
    async fn test_general_route_policy_and_headers() {
        let response = server(GatewayConfig::default())
            .oneshot(
                Request::get("/api/sequences-count")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CACHE_CONTROL], "private, max-age=60");
        assert!(headers.contains_key(header::ETAG));
        assert_eq!(headers["ratelimit-limit"], "100");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_foreign_origin_rejected_before_limiters() {
        let app = server(GatewayConfig::default());
        let response = app
            .oneshot(
                Request::get("/api/sequences-count")
                    .header(header::ORIGIN, "https://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert!(!response.headers().contains_key("ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_security_headers_can_be_disabled() {
        let mut config = GatewayConfig::default();
        config.security.enable_headers = false;

        let response = server(config)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(!response.headers().contains_key("x-frame-options"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mut config = GatewayConfig::default();
        config.security.max_body_size = 16;

        let response = server(config)
            .oneshot(
                Request::post("/api/auth/login")
                    .header(header::CONTENT_LENGTH, "64")
                    .body(Body::from(vec![b'a'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_disabled_limiters_add_no_headers() {
        let mut config = GatewayConfig::default();
        config.rate_limits.enabled = false;

        let response = server(config)
            .oneshot(Request::get("/api/sequences-count").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("ratelimit-limit"));
    }
}
