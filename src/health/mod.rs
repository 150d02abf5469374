//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probing (active.rs):
//!     Periodic timer
//!     → TCP connect to storage.address
//!     → Update state.rs
//!
//! Handlers (handlers.rs):
//!     GET /api/health[/detailed|/ready|/live|/metrics]
//!     → Read state.rs (atomics, never awaits storage)
//! ```
//!
//! # Design Decisions
//! - An unreachable database is reported, not raised
//! - Probing is optional; without an address storage is "not_configured"

pub mod active;
pub mod handlers;
pub mod state;

pub use active::StorageMonitor;
pub use handlers::{health_router, HealthState};
pub use state::{ConnectionState, StorageHealth, UpstreamUnavailable};
