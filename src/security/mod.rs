//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (hardening headers wrap the whole chain)
//!     → origin.rs (reject disallowed Origin before the body is read)
//!     → rate_limit.rs (general limiter, then the route group's limiter)
//!     → Pass to cache policy and handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: a rejecting stage answers immediately, inner stages never run
//! - Rejections are per-request; nothing here can take the process down
//! - No trust in client input (X-Forwarded-For only when configured)

pub mod error;
pub mod headers;
pub mod origin;
pub mod rate_limit;

pub use error::SecurityError;
pub use origin::{OriginGate, OriginRule};
pub use rate_limit::{AuthenticatedUser, ClientKey, FixedWindowLimiter, LimiterBank, LimiterKind};
