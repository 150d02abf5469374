//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, bind address parses)
//! - Check origin and pattern syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, LimiterConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address `{0}`")]
    BindAddress(String),

    #[error("origin `{0}` is not a valid scheme://host[:port] origin")]
    Origin(String),

    #[error("origin pattern `{0}` must look like `*.example.com`")]
    OriginPattern(String),

    #[error("rate limiter `{name}`: {reason}")]
    Limiter { name: &'static str, reason: &'static str },

    #[error("static mount `{0}` must be a path outside /api")]
    StaticMount(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let cors = &config.cors;
    let origins = cors
        .allowed_origins
        .iter()
        .chain(cors.frontend_url.iter())
        .chain(cors.additional_origin.iter());
    for origin in origins {
        if !is_valid_origin(origin) {
            errors.push(ValidationError::Origin(origin.clone()));
        }
    }

    for pattern in &cors.origin_patterns {
        let valid = pattern
            .strip_prefix("*.")
            .is_some_and(|suffix| !suffix.is_empty() && !suffix.contains(['*', '/', ':']));
        if !valid {
            errors.push(ValidationError::OriginPattern(pattern.clone()));
        }
    }

    let limits = &config.rate_limits;
    for (name, limiter) in [
        ("general", &limits.general),
        ("auth", &limits.auth),
        ("ai", &limits.ai),
        ("upload", &limits.upload),
        ("report", &limits.report),
    ] {
        check_limiter(name, limiter, &mut errors);
    }
    if limits.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero("rate_limits.sweep_interval_secs"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }
    if config.storage.address.is_some() && config.storage.probe_interval_secs == 0 {
        errors.push(ValidationError::Zero("storage.probe_interval_secs"));
    }

    let mount = &config.static_files.mount;
    if config.static_files.dir.is_some()
        && (!mount.starts_with('/') || mount == "/" || mount.starts_with("/api"))
    {
        errors.push(ValidationError::StaticMount(mount.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_limiter(name: &'static str, limiter: &LimiterConfig, errors: &mut Vec<ValidationError>) {
    if limiter.window_secs == 0 {
        errors.push(ValidationError::Limiter {
            name,
            reason: "window_secs must be greater than zero",
        });
    }
    if limiter.max == 0 {
        errors.push(ValidationError::Limiter {
            name,
            reason: "max must be greater than zero",
        });
    }
}

/// An origin is scheme + host + optional port, nothing else. A trailing
/// `/` is tolerated; the origin gate strips it.
fn is_valid_origin(origin: &str) -> bool {
    match Url::parse(origin.trim_end_matches('/')) {
        Ok(url) => {
            url.host_str().is_some()
                && matches!(url.scheme(), "http" | "https")
                && url.path() == "/"
                && url.query().is_none()
                && url.fragment().is_none()
        }
        Err(_) => false,
    }
}
