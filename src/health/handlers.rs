//! `/api/health` endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;

use crate::health::state::{ConnectionState, StorageHealth};

#[derive(Clone)]
pub struct HealthState {
    pub storage: Arc<StorageHealth>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub status: &'static str,
    pub time: String,
    pub database: &'static str,
    pub storage_mode: String,
    pub version: &'static str,
    pub uptime: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCheck {
    pub status: &'static str,
    pub connection: ConnectionState,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
}

#[derive(Serialize)]
pub struct DetailedHealth {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: u64,
    pub version: &'static str,
    pub checks: HealthChecks,
}

/// Routes mounted at `/api/health`.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(get_health))
        .route("/detailed", get(get_detailed))
        .route("/ready", get(get_ready))
        .route("/live", get(get_live))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn get_health(State(state): State<HealthState>) -> Json<HealthSummary> {
    Json(HealthSummary {
        status: "ok",
        time: now(),
        database: state.storage.state().label(),
        storage_mode: state.storage.mode().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.storage.uptime().as_secs_f64(),
    })
}

pub async fn get_detailed(State(state): State<HealthState>) -> Response {
    let connection = state.storage.state();
    let healthy = connection.is_ready();

    let body = DetailedHealth {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: now(),
        uptime: state.storage.uptime().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            database: DatabaseCheck {
                status: if healthy { "healthy" } else { "unhealthy" },
                connection,
                latency_ms: state.storage.latency().map(|d| d.as_millis() as u64),
            },
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

pub async fn get_ready(State(state): State<HealthState>) -> Response {
    if state.storage.state().is_ready() {
        Json(json!({ "ready": true })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": "Database not connected" })),
        )
            .into_response()
    }
}

pub async fn get_live() -> Json<serde_json::Value> {
    Json(json!({ "alive": true }))
}

pub async fn get_metrics(State(state): State<HealthState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics disabled").into_response(),
    }
}
