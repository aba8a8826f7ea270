//! OS signal handling.
//!
//! SIGINT and SIGTERM both request a graceful shutdown.

use crate::lifecycle::shutdown::Shutdown;

/// Wait for SIGINT or SIGTERM and return the signal's name.
pub async fn termination() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    name = ctrl_c() => name,
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for SIGINT only");
                ctrl_c().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Trigger `shutdown` when a termination signal arrives.
pub fn forward_to(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let signal = termination().await;
        tracing::info!(signal, "Shutdown signal received");
        shutdown.trigger();
    })
}
