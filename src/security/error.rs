//! Per-request rejections and their HTTP mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::config::RejectionPayload;
use crate::security::rate_limit::insert_rate_limit_headers;

/// A request declined by the security chain. Terminal for that request only.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("origin not allowed")]
    OriginRejected,

    #[error("rate limit `{limiter}` exceeded")]
    RateLimitExceeded {
        limiter: &'static str,
        limit: u32,
        window_secs: u64,
        reset_after_secs: u64,
        payload: RejectionPayload,
    },
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        match self {
            SecurityError::OriginRejected => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Not allowed by CORS" })),
            )
                .into_response(),
            SecurityError::RateLimitExceeded {
                limit,
                window_secs,
                reset_after_secs,
                payload,
                ..
            } => {
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(payload)).into_response();
                let headers = response.headers_mut();
                insert_rate_limit_headers(headers, limit, window_secs, 0, reset_after_secs);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_after_secs));
                response
            }
        }
    }
}
