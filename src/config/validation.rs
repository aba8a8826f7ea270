//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges. Every problem is
//! reported, not just the first one.

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }
    if config.batch.max_urls == 0 {
        errors.push(ValidationError::new("batch.max_urls", "must be > 0"));
    }
    if config.batch.workers == 0 {
        errors.push(ValidationError::new("batch.workers", "must be > 0"));
    }
    if config.batch.max_request_body_bytes == 0 {
        errors.push(ValidationError::new("batch.max_request_body_bytes", "must be > 0"));
    }
    if config.admission.max_in_flight == 0 {
        errors.push(ValidationError::new("admission.max_in_flight", "must be > 0"));
    }
    if config.fetch.timeout_ms == 0 {
        errors.push(ValidationError::new("fetch.timeout_ms", "must be > 0"));
    }
    if config.fetch.max_body_bytes == 0 {
        errors.push(ValidationError::new("fetch.max_body_bytes", "must be > 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
