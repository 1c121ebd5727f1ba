// Shared fixtures for unit and integration tests

use async_trait::async_trait;
use overflow_store::{
    InMemoryOverflowStore, OverflowRecord, OverflowStats, OverflowStore, OverflowStoreError,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::event::{Event, EventType, Payload, Priority};
use crate::queue::{EnqueueError, EventAdmission, IngestionQueue};

/// Event with a fixed priority regardless of classification
pub fn event_with_priority(event_id: &str, priority: Priority) -> Event {
    let mut event = Event::new(event_id, EventType::Alert, "tests", Payload::new());
    event.priority = priority;
    event
}

/// In-memory store with switchable failures and stalls
#[derive(Default)]
pub struct FlakyOverflowStore {
    inner: InMemoryOverflowStore,
    fail_inserts: AtomicBool,
    fail_mark_processed: AtomicBool,
    stall_retries: AtomicBool,
    insert_delay_ms: AtomicU64,
}

impl FlakyOverflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mark_processed(&self, fail: bool) {
        self.fail_mark_processed.store(fail, Ordering::SeqCst);
    }

    /// Make `increment_retry` hang forever
    pub fn stall_retries(&self, stall: bool) {
        self.stall_retries.store(stall, Ordering::SeqCst);
    }

    /// Hold every insert for `delay` before applying it
    pub fn delay_inserts(&self, delay: Duration) {
        self.insert_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn unavailable() -> OverflowStoreError {
        OverflowStoreError::Generic("store unavailable".to_string())
    }
}

#[async_trait]
impl OverflowStore for FlakyOverflowStore {
    async fn insert(&self, record: OverflowRecord) -> overflow_store::Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.insert(record).await
    }

    async fn get(&self, event_id: &str) -> overflow_store::Result<Option<OverflowRecord>> {
        self.inner.get(event_id).await
    }

    async fn list(
        &self,
        processed: Option<bool>,
        limit: usize,
    ) -> overflow_store::Result<Vec<OverflowRecord>> {
        self.inner.list(processed, limit).await
    }

    async fn list_pending(&self, limit: usize) -> overflow_store::Result<Vec<OverflowRecord>> {
        self.inner.list_pending(limit).await
    }

    async fn mark_processed(&self, event_id: &str) -> overflow_store::Result<()> {
        if self.fail_mark_processed.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.mark_processed(event_id).await
    }

    async fn increment_retry(&self, event_id: &str, error_message: &str) -> overflow_store::Result<u32> {
        if self.stall_retries.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.increment_retry(event_id, error_message).await
    }

    async fn cleanup_older_than(&self, age: Duration) -> overflow_store::Result<usize> {
        self.inner.cleanup_older_than(age).await
    }

    async fn stats(&self) -> overflow_store::Result<OverflowStats> {
        self.inner.stats().await
    }
}

/// Admission that reports a full queue on one chosen call
pub struct ScriptedAdmission {
    pub queue: IngestionQueue,
    calls: AtomicUsize,
    fail_on_call: usize,
}

impl ScriptedAdmission {
    pub fn new(capacity: usize, fail_on_call: usize) -> Self {
        Self { queue: IngestionQueue::new(capacity), calls: AtomicUsize::new(0), fail_on_call }
    }
}

impl EventAdmission for ScriptedAdmission {
    fn admit(&self, event: Event) -> Result<(), EnqueueError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(EnqueueError::Full(event));
        }
        self.queue.try_enqueue(event)
    }

    fn size(&self) -> usize {
        self.queue.size()
    }

    fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}
