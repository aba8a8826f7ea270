//! Structured logging.
//!
//! Uses the tracing crate for structured logging. The filter comes from
//! `RUST_LOG` when set, otherwise from the configured log level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global tracing subscriber. Call once, at startup.
pub fn init(config: &ObservabilityConfig) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_filter(config: &ObservabilityConfig) -> EnvFilter {
    let level = &config.log_level;
    EnvFilter::new(format!("fetch_gateway={level},sleep_server={level},tower_http={level}"))
}
