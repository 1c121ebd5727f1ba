//! Local file-based overflow store
//!
//! Each record lives in its own JSON file under `<data_dir>/overflow`, named
//! by the SHA-256 of its event id. Writes go to a temporary file that is
//! renamed over the record, so readers always observe either the previous or
//! the new version of a record.

use crate::backend::{retention_cutoff, validate_record, OverflowStore};
use crate::config::OverflowStoreConfig;
use crate::error::{OverflowStoreError, Result};
use crate::record::{OverflowRecord, OverflowStats};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Extension of record files
const RECORD_EXTENSION: &str = "overflow";

/// Extension of in-progress writes
const TEMP_EXTENSION: &str = "tmp";

/// Local file-based overflow store
pub struct LocalOverflowStore {
    config: OverflowStoreConfig,
    records_dir: PathBuf,
    record_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one record; the lock entry is released when unused
struct RecordGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    event_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.event_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl LocalOverflowStore {
    /// Open (creating if needed) a store at the configured data directory
    pub fn open(config: OverflowStoreConfig) -> Result<Self> {
        config.validate().map_err(OverflowStoreError::config)?;

        let records_dir = config.records_dir();
        std::fs::create_dir_all(&records_dir).map_err(OverflowStoreError::Io)?;

        tracing::info!("Local overflow store opened at: {:?}", records_dir);

        Ok(Self { config, records_dir, record_locks: DashMap::new() })
    }

    /// Open a store with default configuration rooted at `data_dir`
    pub fn with_default_config(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open(OverflowStoreConfig::new(data_dir))
    }

    /// Get the configuration
    pub fn config(&self) -> &OverflowStoreConfig {
        &self.config
    }

    /// Directory holding the record files
    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    /// Path of the record file for `event_id`
    ///
    /// The name length is independent of the id, so any id that passes
    /// validation maps to a legal file name.
    fn record_path(&self, event_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(event_id.as_bytes());
        let filename = format!("{:x}.{}", hasher.finalize(), RECORD_EXTENSION);
        self.records_dir.join(filename)
    }

    async fn lock_record(&self, event_id: &str) -> RecordGuard<'_> {
        let lock = self
            .record_locks
            .entry(event_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;

        RecordGuard { locks: &self.record_locks, event_id: event_id.to_string(), guard: Some(guard) }
    }

    async fn read_record(path: &Path) -> Result<Option<OverflowRecord>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| {
                    OverflowStoreError::corruption(format!("{}: {e}", path.display()))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OverflowStoreError::Io(e)),
        }
    }

    async fn write_record(&self, record: &OverflowRecord) -> Result<()> {
        let path = self.record_path(&record.event_id);
        let temp_path = path.with_extension(TEMP_EXTENSION);

        let bytes = serde_json::to_vec(record).map_err(OverflowStoreError::Serialization)?;
        tokio::fs::write(&temp_path, &bytes).await.map_err(OverflowStoreError::Io)?;

        if self.config.fsync_writes {
            let file = tokio::fs::File::open(&temp_path).await.map_err(OverflowStoreError::Io)?;
            file.sync_all().await.map_err(OverflowStoreError::Io)?;
        }

        tokio::fs::rename(&temp_path, &path).await.map_err(OverflowStoreError::Io)?;

        Ok(())
    }

    /// Load a record under its lock, apply `update`, and write it back
    async fn update_record<T>(
        &self,
        event_id: &str,
        update: impl FnOnce(&mut OverflowRecord) -> T,
    ) -> Result<T> {
        let _guard = self.lock_record(event_id).await;

        let path = self.record_path(event_id);
        let mut record =
            Self::read_record(&path).await?.ok_or_else(|| OverflowStoreError::not_found(event_id))?;

        let result = update(&mut record);
        self.write_record(&record).await?;

        Ok(result)
    }

    /// Read every record file; unreadable files are skipped with a warning
    async fn load_all(&self) -> Result<Vec<OverflowRecord>> {
        let mut records = Vec::new();
        let mut entries =
            tokio::fs::read_dir(&self.records_dir).await.map_err(OverflowStoreError::Io)?;

        while let Some(entry) = entries.next_entry().await.map_err(OverflowStoreError::Io)? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                // Deleted between listing and reading
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable overflow record: {}", e),
            }
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl OverflowStore for LocalOverflowStore {
    async fn insert(&self, record: OverflowRecord) -> Result<()> {
        validate_record(&record)?;

        let _guard = self.lock_record(&record.event_id).await;
        self.write_record(&record).await?;

        tracing::debug!(
            "Stored overflow record {} (priority {})",
            record.event_id,
            record.priority
        );

        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<OverflowRecord>> {
        Self::read_record(&self.record_path(event_id)).await
    }

    async fn list(&self, processed: Option<bool>, limit: usize) -> Result<Vec<OverflowRecord>> {
        let mut records = self.load_all().await?;

        records.retain(|r| processed.map_or(true, |p| r.processed == p));
        records.sort_by(OverflowRecord::newest_first);
        records.truncate(limit);

        Ok(records)
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<OverflowRecord>> {
        let mut records = self.load_all().await?;

        records.retain(|r| !r.processed);
        records.sort_by(OverflowRecord::pending_order);
        records.truncate(limit);

        Ok(records)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<()> {
        self.update_record(event_id, |record| record.processed = true).await
    }

    async fn increment_retry(&self, event_id: &str, error_message: &str) -> Result<u32> {
        self.update_record(event_id, |record| {
            record.retry_count += 1;
            record.error_message = Some(error_message.to_string());
            record.retry_count
        })
        .await
    }

    async fn cleanup_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = retention_cutoff(age)?;
        let expired = |r: &OverflowRecord| r.processed && r.created_at < cutoff;

        let candidates: Vec<_> =
            self.load_all().await?.into_iter().filter(|r| expired(r)).collect();

        let mut removed = 0;
        for candidate in candidates {
            let _guard = self.lock_record(&candidate.event_id).await;
            let path = self.record_path(&candidate.event_id);

            // Re-check under the lock; the record may have been re-inserted
            match Self::read_record(&path).await? {
                Some(current) if expired(&current) => {
                    tokio::fs::remove_file(&path).await.map_err(OverflowStoreError::Io)?;
                    removed += 1;
                }
                _ => {}
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} processed overflow records older than {:?}", removed, age);
        }

        Ok(removed)
    }

    async fn stats(&self) -> Result<OverflowStats> {
        let records = self.load_all().await?;
        Ok(OverflowStats::from_records(&records))
    }
}

/// Create a new local overflow store with default configuration
pub fn create_local_store(data_dir: impl Into<PathBuf>) -> Result<LocalOverflowStore> {
    LocalOverflowStore::with_default_config(data_dir)
}

/// Create a new local overflow store with custom configuration
pub fn create_local_store_with_config(config: OverflowStoreConfig) -> Result<LocalOverflowStore> {
    LocalOverflowStore::open(config)
}
