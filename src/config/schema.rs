//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the fetch gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Per-batch limits and fan-out width.
    pub batch: BatchConfig,

    /// Global admission control.
    pub admission: AdmissionConfig,

    /// Upstream fetch behaviour.
    pub fetch: FetchConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Limits applied to a single batch request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of URLs accepted in one batch.
    pub max_urls: usize,

    /// Maximum fetches in flight for one batch.
    pub workers: usize,

    /// Maximum size of the request body in bytes.
    pub max_request_body_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_urls: 20,
            workers: 4,
            max_request_body_bytes: 1024 * 1024,
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum batch requests processed at once; excess is rejected with 429.
    pub max_in_flight: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_in_flight: 100 }
    }
}

/// Upstream fetch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Deadline for a single fetch (connect, headers and body) in milliseconds.
    pub timeout_ms: u64,

    /// Bodies are truncated to this many bytes.
    pub max_body_bytes: usize,

    /// Route upstream requests through HTTP(S)_PROXY when set.
    pub honor_proxy_env: bool,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            max_body_bytes: 50,
            honor_proxy_env: true,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight requests get to finish before connections are forced closed.
    pub grace_period_secs: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
