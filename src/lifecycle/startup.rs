//! Startup orchestration.
//!
//! Order: metrics exporter, HTTP client, listener, signal forwarding, serve.
//! Any startup error is fatal; listeners start last so traffic only arrives
//! once everything else is ready.

use std::net::SocketAddr;

use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{Shutdown, ShutdownOutcome};
use crate::lifecycle::signals;
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;

/// Errors that stop the gateway from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Run the gateway until SIGINT/SIGTERM, then shut down.
pub async fn run(config: GatewayConfig) -> Result<ShutdownOutcome, StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let signal_task = signals::forward_to(shutdown.clone());

    let outcome = server.run(listener, shutdown.subscribe()).await?;
    signal_task.abort();

    match outcome {
        ShutdownOutcome::Graceful => tracing::info!("Server exiting"),
        ShutdownOutcome::Forced => tracing::warn!("Server forced to shutdown"),
    }
    Ok(outcome)
}
