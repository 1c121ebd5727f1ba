// Configuration structures for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of events held in the ingestion queue
    pub queue_capacity: usize,

    /// Maximum serialized payload size in bytes
    pub max_payload_bytes: usize,

    /// Buffer size of the notification broadcast channel
    pub notification_capacity: usize,

    /// When neither eviction nor overflow can place an event, admit it by
    /// dropping the oldest queued event instead of rejecting it
    pub drop_oldest_on_store_failure: bool,

    /// Consumer start/stop behavior
    pub lifecycle: LifecycleConfig,

    /// Overflow recovery behavior
    pub recovery: RecoveryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 500,
            max_payload_bytes: 10 * 1024,
            notification_capacity: 1024,
            drop_oldest_on_store_failure: true,
            lifecycle: LifecycleConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Configuration for the consumer lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// How long a stop waits for the consumer before cancelling it
    pub stop_timeout: Duration,

    /// Whether the consumer starts together with the pipeline
    pub auto_start: bool,

    /// Whether queued events are written to overflow on shutdown
    pub flush_on_shutdown: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { stop_timeout: Duration::from_secs(30), auto_start: true, flush_on_shutdown: true }
    }
}

/// Configuration for overflow recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Batch size used when the caller does not give one
    pub default_batch_size: usize,

    /// Upper bound on a single recovery batch
    pub max_batch_size: usize,

    /// Retry count at which a failing record is reported as permanent
    pub max_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { default_batch_size: 100, max_batch_size: 1000, max_retries: 5 }
    }
}

impl PipelineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".to_string());
        }

        if self.max_payload_bytes == 0 {
            return Err("max_payload_bytes must be greater than 0".to_string());
        }

        if self.notification_capacity == 0 {
            return Err("notification_capacity must be greater than 0".to_string());
        }

        if self.lifecycle.stop_timeout.is_zero() {
            return Err("lifecycle.stop_timeout must be greater than 0".to_string());
        }

        if self.recovery.default_batch_size == 0 {
            return Err("recovery.default_batch_size must be greater than 0".to_string());
        }

        if self.recovery.default_batch_size > self.recovery.max_batch_size {
            return Err("recovery.default_batch_size must not exceed max_batch_size".to_string());
        }

        Ok(())
    }
}
