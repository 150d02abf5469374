//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, pipeline composition)
//!     → request.rs (add/propagate request ID)
//!     → response.rs (X-Response-Time, request metrics)
//!     → routes.rs (/api groups, limiters per group)
//!     → cache_control.rs (Cache-Control + ETag on the way out)
//!     → Send to client
//! ```

pub mod cache_control;
pub mod request;
pub mod response;
pub mod routes;
pub mod server;

pub use cache_control::CachePolicy;
pub use request::X_REQUEST_ID;
pub use routes::ApiRoutes;
pub use server::{AppState, HttpServer};
