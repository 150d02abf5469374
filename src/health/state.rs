//! Storage connection state shared between the probe and the handlers.
//!
//! # States
//! ```text
//! NotConfigured            (no storage.address, never probed)
//! Connecting → Connected   (first probe succeeded)
//! Connecting → Disconnected
//! Connected ↔ Disconnected (every probe overwrites)
//! ```
//!
//! # Design Decisions
//! - Atomics only: handlers read without blocking or awaiting
//! - Unreachable storage is a status, never an error to the caller

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

/// Why the storage collaborator could not be reached.
#[derive(Debug, Error)]
pub enum UpstreamUnavailable {
    #[error("storage probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage unreachable: {0}")]
    Connect(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotConfigured,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnected,
            _ => ConnectionState::NotConfigured,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::NotConfigured => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Disconnected => 3,
        }
    }

    /// Label used in the basic health payload.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::NotConfigured => "not_configured",
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting | ConnectionState::Disconnected => "disconnected",
        }
    }

    /// Whether traffic that needs storage can be served.
    pub fn is_ready(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::NotConfigured)
    }
}

const NO_LATENCY: u64 = u64::MAX;

/// Process-wide storage health, written by the monitor.
#[derive(Debug)]
pub struct StorageHealth {
    mode: String,
    state: AtomicU8,
    latency_ms: AtomicU64,
    started: Instant,
}

impl StorageHealth {
    pub fn new(mode: impl Into<String>, probed: bool) -> Self {
        let initial = if probed {
            ConnectionState::Connecting
        } else {
            ConnectionState::NotConfigured
        };
        Self {
            mode: mode.into(),
            state: AtomicU8::new(initial.as_u8()),
            latency_ms: AtomicU64::new(NO_LATENCY),
            started: Instant::now(),
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Last successful probe latency.
    pub fn latency(&self) -> Option<Duration> {
        match self.latency_ms.load(Ordering::Relaxed) {
            NO_LATENCY => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Apply a probe outcome.
    pub fn record(&self, outcome: &Result<Duration, UpstreamUnavailable>) {
        let (state, latency) = match outcome {
            Ok(latency) => (ConnectionState::Connected, latency.as_millis() as u64),
            Err(_) => (ConnectionState::Disconnected, NO_LATENCY),
        };
        let previous = self.state.swap(state.as_u8(), Ordering::Relaxed);
        self.latency_ms.store(latency, Ordering::Relaxed);

        if previous != state.as_u8() {
            match outcome {
                Ok(_) => tracing::info!(mode = %self.mode, "Storage reachable"),
                Err(e) => tracing::warn!(mode = %self.mode, error = %e, "Storage unreachable"),
            }
        }
    }
}
