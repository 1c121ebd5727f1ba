//! Ingestion Service
//!
//! Runs the bounded ingestion pipeline behind an HTTP API, or performs
//! offline maintenance on the overflow store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ingestion_service::{
    graceful_shutdown, initialize_logging_with_config, load_configuration, service,
    setup_signal_handlers, ServiceConfig, ServiceState,
};

#[derive(Parser)]
#[command(name = "ingestion-service")]
#[command(about = "Bounded real-time event ingestion with durable overflow")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion service (default)
    Serve,

    /// Maintain the overflow store without running the service
    Overflow {
        #[command(subcommand)]
        action: OverflowCommands,
    },
}

#[derive(Subcommand)]
enum OverflowCommands {
    /// Print overflow statistics as JSON
    Stats,

    /// Delete processed records older than the given number of days
    Cleanup {
        #[arg(long, default_value = "7")]
        days: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = load_configuration(cli.config.as_deref())?;

    initialize_logging_with_config(&config.logging.level, &config.logging.format)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Overflow { action: OverflowCommands::Stats } => {
            let stats = service::overflow_stats(&config).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Overflow { action: OverflowCommands::Cleanup { days } } => {
            let secs = days.checked_mul(24 * 60 * 60).context("--days is out of range")?;
            let removed = service::overflow_cleanup(&config, Duration::from_secs(secs)).await?;
            println!("{}", serde_json::json!({ "deleted_count": removed, "older_than_days": days }));
            Ok(())
        }
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    info!("Starting Ingestion Service v{}", env!("CARGO_PKG_VERSION"));

    let service_state = Arc::new(ServiceState::new(config)?);
    info!("Service state initialized");

    let shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    let (_, server_handle) = service_state.spawn_http_server()?;
    let retention_handle = service_state.spawn_retention_task();

    service_state.start_processing().await;

    let stats = service_state.pipeline.overflow_stats().await?;
    if stats.pending > 0 {
        info!("{} overflow record(s) pending recovery", stats.pending);
    }

    info!("Ingestion Service is running. Press Ctrl+C to stop.");

    let _ = shutdown_signal.await;
    info!("Shutdown signal received");

    graceful_shutdown(service_state, server_handle, retention_handle).await
}
