//! Batch fetch gateway.
//!
//! Accepts `POST {"urls": [...]}`, fetches every URL with bounded
//! parallelism and answers with the truncated bodies in request order.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request           ┌──────────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ net::listener ─▶ http::server ─▶ admission    │
//!                              │                                      │           │
//!                              │                                      ▼           │
//!                              │                              fetch::coordinator  │
//!                              │                               │  │  │  │ (≤ 4)   │
//!                              │                               ▼  ▼  ▼  ▼         │
//!     Client Response          │                              fetch::fetcher ─────┼──▶ Upstreams
//!     ◀────────────────────────┼── http::response ◀── ordered results / 1st error │
//!                              │                                                  │
//!                              │  config · observability · lifecycle (shutdown)   │
//!                              └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use fetch_gateway::config::{load_config, GatewayConfig};
use fetch_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "fetch-gateway")]
#[command(about = "Fetch batches of URLs concurrently and return truncated bodies", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!("fetch-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_in_flight = config.admission.max_in_flight,
        max_urls = config.batch.max_urls,
        workers = config.batch.workers,
        fetch_timeout_ms = config.fetch.timeout_ms,
        "Configuration loaded"
    );

    fetch_gateway::lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
