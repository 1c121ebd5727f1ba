//! Service state and component wiring

use anyhow::{Context, Result};
use ingestion_pipeline::{IngestionPipeline, LoggingEventHandler, StartOutcome};
use overflow_store::{create_local_store_with_config, LocalOverflowStore, OverflowStats, OverflowStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::http;

/// Main service state shared by the HTTP server and background tasks
pub struct ServiceState {
    pub config: ServiceConfig,
    pub pipeline: Arc<IngestionPipeline>,
    shutdown: CancellationToken,
}

impl ServiceState {
    /// Open the overflow store and build the pipeline
    pub fn new(config: ServiceConfig) -> Result<Self> {
        info!("Opening overflow store at {:?}", config.storage.data_dir);
        let store = open_store(&config)?;

        let pipeline = IngestionPipeline::new(
            config.pipeline.clone(),
            Arc::new(store),
            Arc::new(LoggingEventHandler),
        )
        .context("Failed to create ingestion pipeline")?;

        Ok(Self { config, pipeline: Arc::new(pipeline), shutdown: CancellationToken::new() })
    }

    /// Start the consumer when `auto_start` is set
    pub async fn start_processing(&self) {
        if !self.config.pipeline.lifecycle.auto_start {
            info!("Event processing auto-start disabled; waiting for an operator");
            return;
        }

        if let StartOutcome::Started { start_time } = self.pipeline.start().await {
            info!("Event processing started at {}", start_time);
        }
    }

    /// Bind the HTTP listener and serve until shutdown
    pub fn spawn_http_server(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.config.server.host, self.config.server.port
                )
            })?;

        let routes = http::create_routes(self.pipeline.clone());
        let shutdown = self.shutdown.clone();

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })
            .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;

        info!("HTTP server listening on {}", bound);
        Ok((bound, tokio::spawn(server)))
    }

    /// Run scheduled retention cleanup until shutdown
    pub fn spawn_retention_task(&self) -> Option<JoinHandle<()>> {
        let retention = &self.config.storage.retention;
        if !retention.auto_cleanup {
            info!("Scheduled overflow cleanup disabled");
            return None;
        }

        Some(tokio::spawn(run_retention(
            self.pipeline.clone(),
            retention.processed_retention,
            retention.cleanup_interval,
            self.shutdown.clone(),
        )))
    }

    /// Signal the HTTP server and background tasks to stop
    pub fn cancel_background_tasks(&self) {
        self.shutdown.cancel();
    }

    /// Stop the consumer and flush the queue to overflow
    pub async fn shutdown(&self) -> Result<()> {
        self.pipeline.shutdown().await.context("Pipeline shutdown failed")?;

        let stats = self.pipeline.overflow_stats().await.context("Failed to read overflow stats")?;
        info!("Overflow store holds {} pending record(s) at shutdown", stats.pending);

        Ok(())
    }
}

async fn run_retention(
    pipeline: Arc<IngestionPipeline>,
    retention_age: Duration,
    every: Duration,
    shutdown: CancellationToken,
) {
    info!("Overflow retention task running every {:?} (retention {:?})", every, retention_age);

    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => match pipeline.cleanup_overflow(retention_age).await {
                Ok(removed) => info!("Scheduled cleanup removed {} overflow record(s)", removed),
                Err(e) => warn!("Scheduled overflow cleanup failed: {}", e),
            },
        }
    }

    info!("Overflow retention task stopped");
}

/// Open the durable overflow store described by `config`
pub fn open_store(config: &ServiceConfig) -> Result<LocalOverflowStore> {
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!("Failed to create data directory: {:?}", config.storage.data_dir)
    })?;

    create_local_store_with_config(config.storage.clone())
        .with_context(|| format!("Failed to open overflow store at {:?}", config.storage.data_dir))
}

/// Offline statistics over the durable store
pub async fn overflow_stats(config: &ServiceConfig) -> Result<OverflowStats> {
    let store = open_store(config)?;
    store.stats().await.context("Failed to read overflow stats")
}

/// Offline retention cleanup over the durable store
pub async fn overflow_cleanup(config: &ServiceConfig, older_than: Duration) -> Result<usize> {
    let store = open_store(config)?;
    let removed =
        store.cleanup_older_than(older_than).await.context("Failed to clean up overflow store")?;

    info!("Removed {} processed overflow record(s)", removed);
    Ok(removed)
}
