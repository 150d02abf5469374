//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics recorder when enabled
//! - Build the server state from the validated configuration
//! - Bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::io;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ConfigError, GatewayConfig};
use crate::http::{ApiRoutes, HttpServer};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// A server with its bound listener, ready to run.
pub struct Started {
    pub server: HttpServer,
    pub listener: TcpListener,
}

/// Build the server and bind its listener.
pub async fn start(config: GatewayConfig, api: ApiRoutes) -> Result<Started, StartupError> {
    let handle = if config.observability.metrics_enabled {
        let handle = metrics::install_recorder();
        if handle.is_none() {
            tracing::warn!("Metrics recorder already installed, /api/health/metrics disabled");
        }
        handle
    } else {
        None
    };

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;

    tracing::info!(
        address = %address,
        rate_limits = config.rate_limits.enabled,
        storage_mode = %config.storage.mode,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    Ok(Started {
        server: HttpServer::new(config, api, handle),
        listener,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = GatewayConfig::default();
        config.observability.metrics_enabled = false;
        config.listener.bind_address = taken.local_addr().unwrap().to_string();

        let err = start(config, ApiRoutes::new()).await.err().unwrap();
        assert!(matches!(err, StartupError::Bind { .. }));
    }
}
