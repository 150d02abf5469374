//! Shared utilities for integration testing.

use std::path::PathBuf;

use axum::{
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use symbio_gateway::lifecycle::{self, Shutdown};
use symbio_gateway::{ApiRoutes, CachePolicy, GatewayConfig};

/// A gateway serving on an ephemeral port. Shuts down on drop.
pub struct TestGateway {
    pub base: String,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Stand-ins for the domain routers.
pub fn test_routes() -> ApiRoutes {
    ApiRoutes::new()
        .general(
            Router::new()
                .route("/items", get(|| async { Json(json!({ "items": [1, 2, 3] })) }))
                .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR })),
            CachePolicy::private(60),
        )
        .auth(
            Router::new().route(
                "/login",
                post(|headers: HeaderMap| async move {
                    match headers.get("x-password").and_then(|v| v.to_str().ok()) {
                        Some("correct") => (StatusCode::OK, Json(json!({ "token": "t" }))),
                        _ => (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({ "error": "Invalid credentials" })),
                        ),
                    }
                }),
            ),
            CachePolicy::none(),
        )
        .ai(
            Router::new().route("/chat", post(|| async { Json(json!({ "reply": "hi" })) })),
            CachePolicy::none(),
        )
        .reports(
            Router::new().route("/summary", get(|| async { "report" })),
            CachePolicy::private(30),
        )
}

/// Directory holding a single `app.js`.
pub fn static_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("symbio-static-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("app.js"), "console.log('symbio');").unwrap();
    dir
}

pub async fn spawn_gateway(mut config: GatewayConfig) -> TestGateway {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.observability.metrics_enabled = false;

    let started = lifecycle::start(config, test_routes()).await.unwrap();
    let addr = started.listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    tokio::spawn(started.server.run(started.listener, shutdown.clone()));

    TestGateway {
        base: format!("http://{addr}"),
        shutdown,
    }
}
