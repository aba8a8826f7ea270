//! Sleep simulator: `GET /<duration>` waits, then answers `ok`.

use clap::Parser;
use fetch_gateway::config::ObservabilityConfig;
use fetch_gateway::lifecycle::signals;
use fetch_gateway::observability::logging;
use fetch_gateway::simulator;

#[derive(Parser)]
#[command(name = "sleep-server")]
#[command(about = "Upstream that sleeps for the requested duration before replying", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&ObservabilityConfig::default());

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Sleep simulator listening");

    axum::serve(listener, simulator::router())
        .with_graceful_shutdown(async {
            let signal = signals::termination().await;
            tracing::info!(signal, "Shutdown signal received");
        })
        .await?;
    Ok(())
}
