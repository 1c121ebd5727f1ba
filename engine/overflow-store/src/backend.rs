//! Overflow store trait and the in-memory implementation

use crate::error::{OverflowStoreError, Result};
use crate::record::{OverflowRecord, OverflowStats};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Durable, queryable storage for events the ingestion queue could not hold
///
/// Every mutation of a single record is serialized against other mutations of
/// the same record, so concurrent `increment_retry` and `mark_processed` calls
/// never lose an update.
#[async_trait::async_trait]
pub trait OverflowStore: Send + Sync {
    /// Upsert a record keyed by `event_id`; an existing record is overwritten
    async fn insert(&self, record: OverflowRecord) -> Result<()>;

    /// Load a single record
    async fn get(&self, event_id: &str) -> Result<Option<OverflowRecord>>;

    /// List records, optionally filtered by `processed`, newest first
    async fn list(&self, processed: Option<bool>, limit: usize) -> Result<Vec<OverflowRecord>>;

    /// Unprocessed records, most urgent then oldest first
    async fn list_pending(&self, limit: usize) -> Result<Vec<OverflowRecord>>;

    /// Flag a record as re-admitted
    async fn mark_processed(&self, event_id: &str) -> Result<()>;

    /// Record a failed re-admission; returns the new retry count
    async fn increment_retry(&self, event_id: &str, error_message: &str) -> Result<u32>;

    /// Delete processed records that entered overflow more than `age` ago
    async fn cleanup_older_than(&self, age: Duration) -> Result<usize>;

    /// Aggregate statistics
    async fn stats(&self) -> Result<OverflowStats>;
}

/// Cutoff timestamp for a retention age
pub(crate) fn retention_cutoff(age: Duration) -> Result<chrono::DateTime<Utc>> {
    let age = chrono::Duration::from_std(age)
        .map_err(|e| OverflowStoreError::config(format!("Invalid retention age: {e}")))?;

    Ok(Utc::now() - age)
}

pub(crate) fn validate_record(record: &OverflowRecord) -> Result<()> {
    if record.event_id.is_empty() {
        return Err(OverflowStoreError::invalid_record("event_id must not be empty"));
    }

    Ok(())
}

/// In-memory overflow store (for testing and development)
pub struct InMemoryOverflowStore {
    records: Arc<Mutex<HashMap<String, OverflowRecord>>>,
}

impl InMemoryOverflowStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self { records: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl Default for InMemoryOverflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OverflowStore for InMemoryOverflowStore {
    async fn insert(&self, record: OverflowRecord) -> Result<()> {
        validate_record(&record)?;

        let mut records = self.records.lock().await;
        records.insert(record.event_id.clone(), record);

        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<OverflowRecord>> {
        let records = self.records.lock().await;
        Ok(records.get(event_id).cloned())
    }

    async fn list(&self, processed: Option<bool>, limit: usize) -> Result<Vec<OverflowRecord>> {
        let records = self.records.lock().await;

        let mut matching: Vec<_> = records
            .values()
            .filter(|r| processed.map_or(true, |p| r.processed == p))
            .cloned()
            .collect();
        matching.sort_by(OverflowRecord::newest_first);
        matching.truncate(limit);

        Ok(matching)
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<OverflowRecord>> {
        let records = self.records.lock().await;

        let mut pending: Vec<_> = records.values().filter(|r| !r.processed).cloned().collect();
        pending.sort_by(OverflowRecord::pending_order);
        pending.truncate(limit);

        Ok(pending)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<()> {
        let mut records = self.records.lock().await;

        let record =
            records.get_mut(event_id).ok_or_else(|| OverflowStoreError::not_found(event_id))?;
        record.processed = true;

        Ok(())
    }

    async fn increment_retry(&self, event_id: &str, error_message: &str) -> Result<u32> {
        let mut records = self.records.lock().await;

        let record =
            records.get_mut(event_id).ok_or_else(|| OverflowStoreError::not_found(event_id))?;
        record.retry_count += 1;
        record.error_message = Some(error_message.to_string());

        Ok(record.retry_count)
    }

    async fn cleanup_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = retention_cutoff(age)?;
        let mut records = self.records.lock().await;

        let before = records.len();
        records.retain(|_, r| !(r.processed && r.created_at < cutoff));

        Ok(before - records.len())
    }

    async fn stats(&self) -> Result<OverflowStats> {
        let records = self.records.lock().await;
        Ok(OverflowStats::from_records(records.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, priority: u8) -> OverflowRecord {
        OverflowRecord::new(id, "alert", priority, Utc::now(), "tests", r#"{"k":"v"}"#)
    }

    #[tokio::test]
    async fn test_insert_is_an_upsert() {
        let store = InMemoryOverflowStore::new();

        store.insert(record("evt-1", 4)).await.unwrap();
        store.insert(record("evt-1", 1)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(store.get("evt-1").await.unwrap().unwrap().priority, 1);
    }

    #[tokio::test]
    async fn test_empty_event_id_rejected() {
        let store = InMemoryOverflowStore::new();
        let result = store.insert(record("", 2)).await;
        assert!(matches!(result, Err(OverflowStoreError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_increment_retry_keeps_processed_flag() {
        let store = InMemoryOverflowStore::new();
        store.insert(record("evt-1", 2)).await.unwrap();

        assert_eq!(store.increment_retry("evt-1", "queue full").await.unwrap(), 1);
        assert_eq!(store.increment_retry("evt-1", "queue still full").await.unwrap(), 2);

        let stored = store.get("evt-1").await.unwrap().unwrap();
        assert!(!stored.processed);
        assert_eq!(stored.error_message.as_deref(), Some("queue still full"));
    }

    #[tokio::test]
    async fn test_mark_processed_unknown_id() {
        let store = InMemoryOverflowStore::new();
        let err = store.mark_processed("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_processed() {
        let store = InMemoryOverflowStore::new();

        let mut old_pending = record("old-pending", 4);
        old_pending.created_at = Utc::now() - chrono::Duration::days(30);
        let mut old_done = record("old-done", 4);
        old_done.created_at = Utc::now() - chrono::Duration::days(30);
        old_done.processed = true;
        let mut fresh_done = record("fresh-done", 4);
        fresh_done.processed = true;

        store.insert(old_pending).await.unwrap();
        store.insert(old_done).await.unwrap();
        store.insert(fresh_done).await.unwrap();

        let removed = store.cleanup_older_than(Duration::from_secs(24 * 60 * 60)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("old-pending").await.unwrap().is_some());
        assert!(store.get("old-done").await.unwrap().is_none());
        assert!(store.get("fresh-done").await.unwrap().is_some());
    }
}
