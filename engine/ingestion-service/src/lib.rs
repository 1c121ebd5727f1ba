//! Ingestion Service Library
//!
//! Wires the ingestion pipeline to a durable overflow store and exposes it
//! over HTTP, with configuration loading, logging setup and graceful
//! shutdown handling.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod http;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::ServiceConfig;
pub use logging::initialize_logging_with_config;
pub use service::ServiceState;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
