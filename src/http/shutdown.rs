//! Signal handling for the standalone binary.
//!
//! SIGTERM/SIGINT: stop the health server and let in-flight requests finish.

use std::time::Duration;

use super::server::HealthServer;

/// Wait for Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is
/// never observed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping health server");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping health server");
        }
    }
}

/// Stop `server` when a termination signal arrives.
///
/// In-flight requests get up to `grace` to complete.
pub fn setup_shutdown_handler(server: HealthServer, grace: Duration) {
    tokio::spawn(async move {
        shutdown_signal().await;
        server.stop_with_grace(grace);
        tracing::info!(
            grace_secs = grace.as_secs(),
            "Graceful shutdown initiated"
        );
    });
}
