//! Active storage probing.
//!
//! # Responsibilities
//! - Periodically open a TCP connection to the storage address
//! - Update the shared connection state with the result

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::StorageConfig;
use crate::health::state::{StorageHealth, UpstreamUnavailable};
use crate::observability::metrics;

/// Connect to `address` within `timeout`, returning the connect latency.
pub async fn probe(address: &str, timeout: Duration) -> Result<Duration, UpstreamUnavailable> {
    let start = Instant::now();
    match time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok(start.elapsed()),
        Ok(Err(e)) => Err(UpstreamUnavailable::Connect(e)),
        Err(_) => Err(UpstreamUnavailable::Timeout(timeout)),
    }
}

pub struct StorageMonitor {
    health: Arc<StorageHealth>,
    address: String,
    interval: Duration,
    timeout: Duration,
}

impl StorageMonitor {
    /// `None` when no storage address is configured.
    pub fn new(health: Arc<StorageHealth>, config: &StorageConfig) -> Option<Self> {
        let address = config.address.clone()?;
        Some(Self {
            health,
            address,
            interval: Duration::from_secs(config.probe_interval_secs.max(1)),
            timeout: Duration::from_secs(config.probe_timeout_secs.max(1)),
        })
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            address = %self.address,
            interval = self.interval.as_secs(),
            "Storage monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Storage monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check(&self) {
        let outcome = probe(&self.address, self.timeout).await;
        metrics::record_storage_up(outcome.is_ok());
        self.health.record(&outcome);
    }
}
