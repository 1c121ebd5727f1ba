//! Signal handling for graceful shutdown

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::service::ServiceState;

/// Setup signal handlers for graceful shutdown
///
/// The receiver resolves on the first Ctrl+C or SIGTERM.
pub fn setup_signal_handlers() -> Result<oneshot::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Ctrl+C signal received"),
                Err(e) => error!("Failed to listen for Ctrl+C signal: {}", e),
            },
            _ = sigterm() => info!("SIGTERM signal received"),
        }

        let _ = shutdown_tx.send(());
    });

    Ok(shutdown_rx)
}

#[cfg(unix)]
async fn sigterm() {
    use signal_hook::consts::SIGTERM;
    use std::sync::atomic::{AtomicBool, Ordering};

    let flag = Arc::new(AtomicBool::new(false));

    if let Err(e) = signal_hook::flag::register(SIGTERM, flag.clone()) {
        error!("Failed to register SIGTERM handler: {}", e);
        std::future::pending::<()>().await;
    }

    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}

/// Graceful shutdown handler
///
/// Stops background tasks, waits for the HTTP server to drain, then stops
/// the consumer and flushes the queue.
pub async fn graceful_shutdown(
    service_state: Arc<ServiceState>,
    server_handle: JoinHandle<()>,
    retention_handle: Option<JoinHandle<()>>,
) -> Result<()> {
    info!("Starting graceful shutdown...");

    service_state.cancel_background_tasks();

    let shutdown_timeout = Duration::from_secs(service_state.config.server.shutdown_timeout_secs);

    match timeout(shutdown_timeout, server_handle).await {
        Ok(Ok(())) => info!("HTTP server stopped gracefully"),
        Ok(Err(e)) => error!("HTTP server task failed: {}", e),
        Err(_) => warn!("HTTP server did not stop within timeout, forcing shutdown"),
    }

    if let Some(handle) = retention_handle {
        match timeout(shutdown_timeout, handle).await {
            Ok(Ok(())) => info!("Retention task stopped"),
            Ok(Err(e)) => error!("Retention task failed: {}", e),
            Err(_) => warn!("Retention task did not stop within timeout"),
        }
    }

    if let Err(e) = service_state.shutdown().await {
        error!("Failed to shutdown ingestion pipeline: {}", e);
    }

    info!("Graceful shutdown complete");
    Ok(())
}
