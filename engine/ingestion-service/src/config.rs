//! Service configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ingestion_pipeline::PipelineConfig;
use overflow_store::OverflowStoreConfig;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Main service configuration
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Ingestion pipeline configuration
    pub pipeline: PipelineConfig,

    /// Overflow store and retention configuration
    pub storage: OverflowStoreConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Time allowed for in-flight requests after a shutdown signal
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// On-disk TOML layout
///
/// Durations are written as plain seconds or days. Every key is optional and
/// falls back to the built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    server: Option<ServerConfig>,
    logging: Option<LoggingConfig>,
    pipeline: PipelineSection,
    storage: StorageSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PipelineSection {
    queue_capacity: Option<usize>,
    max_payload_bytes: Option<usize>,
    notification_capacity: Option<usize>,
    drop_oldest_on_store_failure: Option<bool>,
    stop_timeout_secs: Option<u64>,
    auto_start: Option<bool>,
    flush_on_shutdown: Option<bool>,
    default_batch_size: Option<usize>,
    max_batch_size: Option<usize>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StorageSection {
    data_dir: Option<PathBuf>,
    fsync_writes: Option<bool>,
    retention_days: Option<u64>,
    auto_cleanup: Option<bool>,
    cleanup_interval_secs: Option<u64>,
}

/// Load configuration from an optional file, then environment variables
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::default();

    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        config = load_from_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path) -> Result<ServiceConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {:?}", path))?;

    parse_config(&contents).with_context(|| format!("Invalid configuration file: {:?}", path))
}

/// Parse TOML configuration text on top of the defaults
pub fn parse_config(contents: &str) -> Result<ServiceConfig> {
    let file: ConfigFile = toml::from_str(contents).context("Failed to parse TOML")?;

    let mut config = ServiceConfig::default();

    if let Some(server) = file.server {
        config.server = server;
    }
    if let Some(logging) = file.logging {
        config.logging = logging;
    }

    let pipeline = &mut config.pipeline;
    let section = file.pipeline;
    if let Some(v) = section.queue_capacity {
        pipeline.queue_capacity = v;
    }
    if let Some(v) = section.max_payload_bytes {
        pipeline.max_payload_bytes = v;
    }
    if let Some(v) = section.notification_capacity {
        pipeline.notification_capacity = v;
    }
    if let Some(v) = section.drop_oldest_on_store_failure {
        pipeline.drop_oldest_on_store_failure = v;
    }
    if let Some(v) = section.stop_timeout_secs {
        pipeline.lifecycle.stop_timeout = Duration::from_secs(v);
    }
    if let Some(v) = section.auto_start {
        pipeline.lifecycle.auto_start = v;
    }
    if let Some(v) = section.flush_on_shutdown {
        pipeline.lifecycle.flush_on_shutdown = v;
    }
    if let Some(v) = section.default_batch_size {
        pipeline.recovery.default_batch_size = v;
    }
    if let Some(v) = section.max_batch_size {
        pipeline.recovery.max_batch_size = v;
    }
    if let Some(v) = section.max_retries {
        pipeline.recovery.max_retries = v;
    }

    let storage = &mut config.storage;
    let section = file.storage;
    if let Some(v) = section.data_dir {
        storage.data_dir = v;
    }
    if let Some(v) = section.fsync_writes {
        storage.fsync_writes = v;
    }
    if let Some(v) = section.retention_days {
        let secs = v
            .checked_mul(SECS_PER_DAY)
            .with_context(|| format!("retention_days is out of range: {}", v))?;
        storage.retention.processed_retention = Duration::from_secs(secs);
    }
    if let Some(v) = section.auto_cleanup {
        storage.retention.auto_cleanup = v;
    }
    if let Some(v) = section.cleanup_interval_secs {
        storage.retention.cleanup_interval = Duration::from_secs(v);
    }

    Ok(config)
}

/// Apply `INGEST_*` overrides using `lookup` to read variables
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("INGEST_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(format) = lookup("INGEST_LOG_FORMAT") {
        config.logging.format = format;
    }

    if let Some(data_dir) = lookup("INGEST_DATA_DIR") {
        config.storage.data_dir = PathBuf::from(data_dir);
    }

    if let Some(capacity) = lookup("INGEST_QUEUE_CAPACITY") {
        config.pipeline.queue_capacity = parse_var("INGEST_QUEUE_CAPACITY", &capacity)?;
    }

    if let Some(port) = lookup("INGEST_HTTP_PORT") {
        config.server.port = parse_var("INGEST_HTTP_PORT", &port)?;
    }

    if let Some(secs) = lookup("INGEST_STOP_TIMEOUT_SECS") {
        let secs: u64 = parse_var("INGEST_STOP_TIMEOUT_SECS", &secs)?;
        config.pipeline.lifecycle.stop_timeout = Duration::from_secs(secs);
    }

    Ok(())
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().with_context(|| format!("Invalid value for {}: {:?}", key, value))
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.server.port == 0 {
        return Err(anyhow::anyhow!("Invalid HTTP port: {}", config.server.port));
    }

    config.pipeline.validate().map_err(|e| anyhow::anyhow!("Invalid pipeline config: {}", e))?;
    config.storage.validate().map_err(|e| anyhow::anyhow!("Invalid storage config: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.queue_capacity, 500);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_parse_partial_file() {
        let config = parse_config(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [pipeline]
            queue_capacity = 50
            stop_timeout_secs = 5
            max_retries = 3

            [storage]
            data_dir = "/var/lib/ingest"
            retention_days = 2
            cleanup_interval_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.shutdown_timeout_secs, 10);
        assert_eq!(config.pipeline.queue_capacity, 50);
        assert_eq!(config.pipeline.max_payload_bytes, 10 * 1024);
        assert_eq!(config.pipeline.lifecycle.stop_timeout, Duration::from_secs(5));
        assert_eq!(config.pipeline.recovery.max_retries, 3);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/ingest"));
        assert_eq!(
            config.storage.retention.processed_retention,
            Duration::from_secs(2 * SECS_PER_DAY)
        );
        assert_eq!(config.storage.retention.cleanup_interval, Duration::from_secs(600));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_rejects_out_of_range_retention() {
        let err = parse_config("[storage]\nretention_days = 9223372036854775807\n").unwrap_err();
        assert!(err.to_string().contains("retention_days"));

        let config = parse_config("[storage]\nretention_days = 36500\n").unwrap();
        assert_eq!(
            config.storage.retention.processed_retention,
            Duration::from_secs(36_500 * SECS_PER_DAY)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert!(parse_config("[pipeline]\nqueue_size = 10\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\nformat = \"json\"\n").unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");

        assert!(load_from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("INGEST_LOG_LEVEL", "warn"),
                ("INGEST_LOG_FORMAT", "json"),
                ("INGEST_DATA_DIR", "/tmp/ingest"),
                ("INGEST_QUEUE_CAPACITY", "25"),
                ("INGEST_HTTP_PORT", "7070"),
                ("INGEST_STOP_TIMEOUT_SECS", "3"),
            ]),
        )
        .unwrap();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/ingest"));
        assert_eq!(config.pipeline.queue_capacity, 25);
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.pipeline.lifecycle.stop_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = ServiceConfig::default();
        let result = apply_env_overrides(&mut config, env(&[("INGEST_QUEUE_CAPACITY", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServiceConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.pipeline.queue_capacity = 0;
        assert!(validate_config(&config).is_err());
    }
}
