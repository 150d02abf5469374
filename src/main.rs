//! Symbio API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id / trace / response time / security headers
//!                         │
//!                         ▼
//!                     origin gate ──▶ 403
//!                         │
//!                         ▼
//!                 CORS / timeout / body limit / compression
//!                         │
//!                         ▼
//!              /api: general limiter ──▶ 429
//!                         │
//!                         ▼
//!                   group limiter ──▶ 429
//!                         │
//!                         ▼
//!                 Cache-Control + ETag
//!                         │
//!                         ▼
//!                      handler
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use symbio_gateway::config::load_config;
use symbio_gateway::lifecycle::{self, signals, Shutdown, StartupError};
use symbio_gateway::observability::logging;
use symbio_gateway::ApiRoutes;

#[derive(Parser, Debug)]
#[command(name = "symbio-gateway", version, about = "Symbio-NLM API gateway")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "SYMBIO_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init("symbio_gateway=info");
            tracing::error!(error = %e, "Invalid configuration");
            return Err(StartupError::from(e).into());
        }
    };
    logging::init(&config.observability.log_level);

    if args.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "symbio-gateway starting");

    let drain_deadline = Duration::from_secs(config.timeouts.shutdown_secs);
    let started = lifecycle::start(config, ApiRoutes::new()).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let mut stopping = shutdown.subscribe();
    let mut server = tokio::spawn(started.server.run(started.listener, shutdown));

    tokio::select! {
        joined = &mut server => {
            joined??;
            return Ok(());
        }
        _ = stopping.recv() => {}
    }

    match tokio::time::timeout(drain_deadline, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            deadline_secs = drain_deadline.as_secs(),
            "Connections still open after shutdown deadline, exiting"
        ),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
