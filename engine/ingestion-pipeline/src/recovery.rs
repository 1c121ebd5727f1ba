// Replay of overflow records into the ingestion queue

use overflow_store::{OverflowRecord, OverflowStore, OverflowStoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RecoveryConfig;
use crate::event::Event;
use crate::metrics::PipelineMetrics;
use crate::queue::{EnqueueError, EventAdmission};

/// Errors from overflow recovery
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Overflow event not found: {0}")]
    NotFound(String),

    #[error("Ingestion queue at capacity ({size}/{capacity}); retry event {event_id} later")]
    QueueFull { event_id: String, size: usize, capacity: usize, retry_count: Option<u32> },

    #[error("Event {event_id} is already queued")]
    AlreadyQueued { event_id: String, retry_count: Option<u32> },

    #[error("Overflow record {event_id} cannot be replayed: {reason}")]
    Corrupt { event_id: String, reason: String, retry_count: Option<u32> },

    #[error("Overflow store error: {0}")]
    Store(#[from] OverflowStoreError),
}

impl RecoveryError {
    /// Whether the same request may succeed later without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecoveryError::QueueFull { .. } | RecoveryError::AlreadyQueued { .. })
    }

    /// Retry count of the record after this failure, when it was recorded
    pub fn retry_count(&self) -> Option<u32> {
        match self {
            RecoveryError::QueueFull { retry_count, .. }
            | RecoveryError::AlreadyQueued { retry_count, .. }
            | RecoveryError::Corrupt { retry_count, .. } => *retry_count,
            RecoveryError::NotFound(_) | RecoveryError::Store(_) => None,
        }
    }
}

/// Successful outcome of replaying one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Re-admitted to the queue and marked processed
    Requeued,
    /// Already replayed earlier; nothing was enqueued
    AlreadyProcessed,
}

/// One failed record in a batch
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryFailure {
    pub event_id: String,
    pub error: String,
    pub retry_count: Option<u32>,
    /// Retry count reached the configured maximum
    pub permanent: bool,
}

/// Summary of a recovery batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed_count: usize,
    pub failed_count: usize,
    pub failures: Vec<RecoveryFailure>,
}

/// Moves pending overflow records back into the queue
///
/// Recovery only uses free queue space; it never evicts. A record is marked
/// processed only after it has been queued, so a crash in between replays it
/// again rather than losing it.
pub struct RecoveryService {
    admission: Arc<dyn EventAdmission>,
    store: Arc<dyn OverflowStore>,
    config: RecoveryConfig,
    metrics: Arc<PipelineMetrics>,
}

impl RecoveryService {
    pub fn new(
        admission: Arc<dyn EventAdmission>,
        store: Arc<dyn OverflowStore>,
        config: RecoveryConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { admission, store, config, metrics }
    }

    /// Replay a single overflow record
    pub async fn process_one(&self, event_id: &str) -> Result<RecoveryOutcome, RecoveryError> {
        let record = self
            .store
            .get(event_id)
            .await?
            .ok_or_else(|| RecoveryError::NotFound(event_id.to_string()))?;

        self.replay(record).await
    }

    /// Replay up to `max_events` pending records, most urgent first
    ///
    /// Individual failures are counted and reported; only a failure to list
    /// pending records is returned as an error.
    pub async fn process_batch(&self, max_events: Option<usize>) -> Result<BatchReport, RecoveryError> {
        let limit = max_events
            .unwrap_or(self.config.default_batch_size)
            .min(self.config.max_batch_size);

        let mut report = BatchReport::default();
        if limit == 0 {
            return Ok(report);
        }

        let pending = self.store.list_pending(limit).await?;
        tracing::info!("Recovering {} pending overflow event(s)", pending.len());

        for record in pending {
            let event_id = record.event_id.clone();

            match self.replay(record).await {
                Ok(_) => report.processed_count += 1,
                Err(e) => {
                    let retry_count = e.retry_count();
                    let permanent = retry_count.map_or(false, |n| n >= self.config.max_retries);

                    if permanent {
                        tracing::error!(
                            "Overflow event {} failed {} time(s), giving up: {}",
                            event_id,
                            retry_count.unwrap_or_default(),
                            e
                        );
                    } else {
                        tracing::warn!("Failed to recover overflow event {}: {}", event_id, e);
                    }

                    report.failed_count += 1;
                    report.failures.push(RecoveryFailure {
                        event_id,
                        error: e.to_string(),
                        retry_count,
                        permanent,
                    });
                }
            }
        }

        tracing::info!(
            "Overflow recovery finished: {} processed, {} failed",
            report.processed_count,
            report.failed_count
        );

        Ok(report)
    }

    /// Delete processed records older than `retention_age`
    pub async fn cleanup(&self, retention_age: Duration) -> Result<usize, RecoveryError> {
        let removed = self.store.cleanup_older_than(retention_age).await?;
        tracing::info!("Overflow cleanup removed {} processed record(s)", removed);
        Ok(removed)
    }

    async fn replay(&self, record: OverflowRecord) -> Result<RecoveryOutcome, RecoveryError> {
        if record.processed {
            tracing::debug!("Overflow event {} already processed", record.event_id);
            return Ok(RecoveryOutcome::AlreadyProcessed);
        }

        let event_id = record.event_id.clone();

        let event = match Event::from_overflow_record(&record) {
            Ok(event) => event,
            Err(e) => {
                let reason = e.to_string();
                let retry_count = self.record_failure(&event_id, &reason).await;
                return Err(RecoveryError::Corrupt { event_id, reason, retry_count });
            }
        };

        match self.admission.admit(event) {
            Ok(()) => {}
            Err(EnqueueError::Full(_)) => {
                let (size, capacity) = (self.admission.size(), self.admission.capacity());
                let message =
                    format!("Ingestion queue at capacity ({size}/{capacity}), retry later");
                let retry_count = self.record_failure(&event_id, &message).await;
                return Err(RecoveryError::QueueFull { event_id, size, capacity, retry_count });
            }
            Err(EnqueueError::Duplicate(_)) => {
                let retry_count =
                    self.record_failure(&event_id, "An event with this id is already queued").await;
                return Err(RecoveryError::AlreadyQueued { event_id, retry_count });
            }
        }

        if let Err(e) = self.store.mark_processed(&event_id).await {
            tracing::error!(
                "Event {} re-queued but could not be marked processed, it may be replayed again: {}",
                event_id,
                e
            );
        }

        self.metrics.events_recovered_total.inc();
        tracing::debug!("Overflow event {} re-queued", event_id);

        Ok(RecoveryOutcome::Requeued)
    }

    async fn record_failure(&self, event_id: &str, message: &str) -> Option<u32> {
        self.metrics.recovery_failures_total.inc();

        match self.store.increment_retry(event_id, message).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Failed to record retry for overflow event {}: {}", event_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Priority;
    use crate::queue::IngestionQueue;
    use crate::test_support::{event_with_priority, FlakyOverflowStore, ScriptedAdmission};
    use chrono::Utc;
    use overflow_store::InMemoryOverflowStore;

    fn service(
        admission: Arc<dyn EventAdmission>,
        store: Arc<dyn OverflowStore>,
        config: RecoveryConfig,
    ) -> RecoveryService {
        RecoveryService::new(admission, store, config, Arc::new(PipelineMetrics::new()))
    }

    async fn seed(store: &dyn OverflowStore, count: usize) -> Vec<String> {
        let base = Utc::now() - chrono::Duration::minutes(10);
        let mut ids = Vec::new();

        for i in 0..count {
            let mut event = event_with_priority(&format!("evt-{i:02}"), Priority::Medium);
            event.timestamp = base + chrono::Duration::seconds(i as i64);
            store.insert(event.to_overflow_record().unwrap()).await.unwrap();
            ids.push(event.event_id);
        }

        ids
    }

    #[tokio::test]
    async fn test_batch_continues_past_failure() {
        let store = Arc::new(InMemoryOverflowStore::new());
        let ids = seed(&*store, 10).await;
        let admission = Arc::new(ScriptedAdmission::new(20, 3));

        let report = service(admission.clone(), store.clone(), RecoveryConfig::default())
            .process_batch(Some(10))
            .await
            .unwrap();

        assert_eq!(report.processed_count, 9);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.failures[0].event_id, ids[2]);
        assert_eq!(report.failures[0].retry_count, Some(1));
        assert!(!report.failures[0].permanent);

        let failed = store.get(&ids[2]).await.unwrap().unwrap();
        assert_eq!(failed.retry_count, 1);
        assert!(!failed.processed);
        assert!(failed.error_message.unwrap().contains("capacity"));

        assert_eq!(admission.queue.size(), 9);
        assert_eq!(store.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_process_one_queue_full_is_retryable() {
        let store = Arc::new(InMemoryOverflowStore::new());
        let ids = seed(&*store, 1).await;
        let queue = Arc::new(IngestionQueue::new(1));
        queue.try_enqueue(event_with_priority("occupant", Priority::Low)).unwrap();

        let err = service(queue.clone(), store.clone(), RecoveryConfig::default())
            .process_one(&ids[0])
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.retry_count(), Some(1));
        // Recovery never evicts
        assert_eq!(queue.event_ids(), vec!["occupant"]);
    }

    #[tokio::test]
    async fn test_process_one_requeues_and_is_idempotent() {
        let store = Arc::new(InMemoryOverflowStore::new());
        let ids = seed(&*store, 1).await;
        let queue = Arc::new(IngestionQueue::new(4));
        let recovery = service(queue.clone(), store.clone(), RecoveryConfig::default());

        assert_eq!(recovery.process_one(&ids[0]).await.unwrap(), RecoveryOutcome::Requeued);
        assert!(store.get(&ids[0]).await.unwrap().unwrap().processed);

        assert_eq!(recovery.process_one(&ids[0]).await.unwrap(), RecoveryOutcome::AlreadyProcessed);
        assert_eq!(queue.size(), 1);
    }

    #[tokio::test]
    async fn test_process_one_unknown_id() {
        let store = Arc::new(InMemoryOverflowStore::new());
        let queue = Arc::new(IngestionQueue::new(4));

        let err = service(queue, store, RecoveryConfig::default())
            .process_one("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::NotFound(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_corrupt_record_counts_a_retry() {
        let store = Arc::new(InMemoryOverflowStore::new());
        let mut record = event_with_priority("evt-bad", Priority::High).to_overflow_record().unwrap();
        record.event_type = "retired_type".to_string();
        store.insert(record).await.unwrap();
        let queue = Arc::new(IngestionQueue::new(4));

        let err = service(queue.clone(), store.clone(), RecoveryConfig::default())
            .process_one("evt-bad")
            .await
            .unwrap_err();

        assert!(matches!(err, RecoveryError::Corrupt { .. }));
        assert!(!err.is_retryable());
        assert_eq!(store.get("evt-bad").await.unwrap().unwrap().retry_count, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_mark_processed_failure_keeps_record_pending() {
        let store = Arc::new(FlakyOverflowStore::new());
        let ids = seed(&*store, 1).await;
        store.fail_mark_processed(true);
        let queue = Arc::new(IngestionQueue::new(4));

        let outcome = service(queue.clone(), store.clone(), RecoveryConfig::default())
            .process_one(&ids[0])
            .await
            .unwrap();

        assert_eq!(outcome, RecoveryOutcome::Requeued);
        assert!(queue.contains(&ids[0]));
        assert!(!store.get(&ids[0]).await.unwrap().unwrap().processed);
    }

    #[tokio::test]
    async fn test_failures_become_permanent_at_max_retries() {
        let store = Arc::new(InMemoryOverflowStore::new());
        seed(&*store, 1).await;
        let queue = Arc::new(IngestionQueue::new(1));
        queue.try_enqueue(event_with_priority("occupant", Priority::Low)).unwrap();
        let config = RecoveryConfig { max_retries: 2, ..Default::default() };
        let recovery = service(queue, store.clone(), config);

        let first = recovery.process_batch(None).await.unwrap();
        assert!(!first.failures[0].permanent);

        let second = recovery.process_batch(None).await.unwrap();
        assert_eq!(second.failures[0].retry_count, Some(2));
        assert!(second.failures[0].permanent);

        // Still pending and still attempted
        assert_eq!(store.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_batch_size_is_capped() {
        let store = Arc::new(InMemoryOverflowStore::new());
        seed(&*store, 5).await;
        let queue = Arc::new(IngestionQueue::new(10));
        let config = RecoveryConfig { default_batch_size: 2, max_batch_size: 3, max_retries: 5 };
        let recovery = service(queue.clone(), store, config);

        assert_eq!(recovery.process_batch(None).await.unwrap().processed_count, 2);
        assert_eq!(recovery.process_batch(Some(100)).await.unwrap().processed_count, 3);
        assert_eq!(queue.size(), 5);
    }
}
