//! Configuration for the overflow store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the overflow store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverflowStoreConfig {
    /// Base directory for overflow data
    pub data_dir: PathBuf,

    /// Whether to fsync every record write (maximum durability)
    pub fsync_writes: bool,

    /// Retention policy for processed records
    pub retention: RetentionConfig,
}

/// Retention policy for processed overflow records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long processed records are kept before cleanup may delete them
    pub processed_retention: Duration,

    /// Whether the service runs cleanup on a schedule
    pub auto_cleanup: bool,

    /// Interval between scheduled cleanups
    pub cleanup_interval: Duration,
}

impl Default for OverflowStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_writes: true,
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            processed_retention: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            auto_cleanup: true,
            cleanup_interval: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}

impl OverflowStoreConfig {
    /// Create a new configuration with custom data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Default::default() }
    }

    /// Directory holding one file per overflow record
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("overflow")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("Overflow data_dir must not be empty".to_string());
        }

        if self.retention.auto_cleanup && self.retention.cleanup_interval.is_zero() {
            return Err("Retention cleanup_interval must be greater than 0".to_string());
        }

        Ok(())
    }
}
