//! Symbio API gateway library.
//!
//! The request pipeline in front of the Symbio-NLM API: origin admission,
//! per-client rate limiting, cache policy, security headers and health
//! reporting. Domain routes are plugged in through [`ApiRoutes`].

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::{ApiRoutes, CachePolicy, HttpServer};
pub use lifecycle::Shutdown;
