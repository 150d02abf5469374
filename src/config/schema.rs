//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Cross-origin admission rules.
    pub cors: CorsConfig,

    /// Named rate limiters.
    pub rate_limits: RateLimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,

    /// Persistence collaborator settings (reported by health checks).
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Static frontend assets.
    pub static_files: StaticConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3002").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3002".to_string(),
        }
    }
}

/// Origin allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins accepted on exact match.
    pub allowed_origins: Vec<String>,

    /// Host patterns such as `*.vercel.app`.
    pub origin_patterns: Vec<String>,

    /// Frontend origin override (`FRONTEND_URL`).
    pub frontend_url: Option<String>,

    /// One extra origin (`ALLOWED_ORIGIN`).
    pub additional_origin: Option<String>,

    /// Emit `Access-Control-Allow-Credentials: true`.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://localhost:3002".to_string(),
                "http://localhost:5173".to_string(),
            ],
            origin_patterns: vec!["*.vercel.app".to_string()],
            frontend_url: None,
            additional_origin: None,
            allow_credentials: true,
        }
    }
}

/// Body returned with a 429.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RejectionPayload {
    pub error: String,
    pub message: String,
    /// Seconds the client should wait before retrying.
    pub retry_after: u64,
}

/// A single fixed-window limiter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimiterConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests admitted per client per window.
    pub max: u32,

    /// Give back the slot when the response status is below 400.
    #[serde(default)]
    pub skip_successful_requests: bool,

    /// Payload returned on rejection.
    pub rejection: RejectionPayload,
}

impl LimiterConfig {
    fn new(window_secs: u64, max: u32, error: &str, message: &str) -> Self {
        Self {
            window_secs,
            max,
            skip_successful_requests: false,
            rejection: RejectionPayload {
                error: error.to_string(),
                message: message.to_string(),
                retry_after: window_secs,
            },
        }
    }
}

/// The limiter bank.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Key on the first `X-Forwarded-For` hop instead of the peer address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// How often idle entries are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Extra idle time past window expiry before an entry is dropped.
    pub eviction_grace_secs: u64,

    pub general: LimiterConfig,
    pub auth: LimiterConfig,
    pub ai: LimiterConfig,
    pub upload: LimiterConfig,
    pub report: LimiterConfig,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let mut auth = LimiterConfig::new(
            15 * 60,
            10,
            "Too many authentication attempts",
            "Too many login attempts. Please try again after 15 minutes.",
        );
        auth.skip_successful_requests = true;

        Self {
            enabled: true,
            trust_forwarded_for: false,
            sweep_interval_secs: 60,
            eviction_grace_secs: 60,
            general: LimiterConfig::new(
                60,
                100,
                "Too many requests",
                "You have exceeded the rate limit. Please try again in a minute.",
            ),
            auth,
            ai: LimiterConfig::new(
                60,
                20,
                "AI rate limit exceeded",
                "You have made too many AI requests. Please wait a moment.",
            ),
            upload: LimiterConfig::new(
                60 * 60,
                50,
                "Upload limit exceeded",
                "You have uploaded too many files. Please try again later.",
            ),
            report: LimiterConfig::new(
                60,
                10,
                "Report generation limit exceeded",
                "Too many report requests. Please wait a moment.",
            ),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Grace period for draining connections on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            shutdown_secs: 10,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Compress responses.
    pub compression: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 50 * 1024 * 1024, // 50MB, FASTA uploads
            compression: true,
        }
    }
}

/// Persistence collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage mode label reported by health checks ("sqlite" or "atlas").
    pub mode: String,

    /// `host:port` of the database to probe. Unset disables probing.
    pub address: Option<String>,

    /// Probe interval in seconds.
    pub probe_interval_secs: u64,

    /// Probe timeout in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: "sqlite".to_string(),
            address: None,
            probe_interval_secs: 10,
            probe_timeout_secs: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Install the Prometheus recorder and serve `/api/health/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "symbio_gateway=debug,tower_http=debug".to_string(),
            metrics_enabled: true,
        }
    }
}

/// Static asset serving.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticConfig {
    /// Directory to serve. Unset disables static serving.
    pub dir: Option<String>,

    /// URL prefix the directory is mounted at.
    pub mount: String,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            dir: None,
            mount: "/static".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limiters() {
        let limits = RateLimitsConfig::default();
        assert_eq!((limits.general.window_secs, limits.general.max), (60, 100));
        assert_eq!((limits.auth.window_secs, limits.auth.max), (900, 10));
        assert!(limits.auth.skip_successful_requests);
        assert_eq!((limits.ai.window_secs, limits.ai.max), (60, 20));
        assert_eq!((limits.upload.window_secs, limits.upload.max), (3600, 50));
        assert_eq!((limits.report.window_secs, limits.report.max), (60, 10));
        assert_eq!(limits.upload.rejection.retry_after, 3600);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [rate_limits.ai]
            window_secs = 30
            max = 5
            rejection = { error = "slow down", message = "AI quota", retry_after = 30 }
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.rate_limits.ai.max, 5);
        assert!(!config.rate_limits.ai.skip_successful_requests);
        assert_eq!(config.rate_limits.general.max, 100);
        assert_eq!(config.cors.allowed_origins.len(), 4);
    }

    #[test]
    fn test_rejection_payload_is_camel_case() {
        let payload = RateLimitsConfig::default().general.rejection;
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["retryAfter"], 60);
        assert_eq!(json["error"], "Too many requests");
    }
}
