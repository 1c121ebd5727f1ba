// Ingestion pipeline - bounded real-time event admission with durable overflow

mod classifier;
mod config;
mod error;
mod event;
mod eviction;
mod handler;
mod lifecycle;
mod metrics;
mod notification;
mod queue;
mod recovery;

#[cfg(test)]
mod test_support;

pub use classifier::PriorityClassifier;
pub use config::{LifecycleConfig, PipelineConfig, RecoveryConfig};
pub use error::{PipelineError, Result};
pub use event::{Event, EventType, Payload, Priority, MAX_EVENT_ID_LEN};
pub use eviction::{AdmissionOutcome, EvictionCoordinator, EvictionReport, MAX_EVICTION_INSPECTIONS};
pub use handler::{ChannelEventHandler, EventHandler, HandlerError, LoggingEventHandler};
pub use lifecycle::{LifecycleController, LifecyclePhase, ProcessingState, StartOutcome, StopOutcome};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use notification::{Notifier, OverflowReason, PipelineNotification, SubmitStatus};
pub use queue::{EnqueueError, EventAdmission, HeadInspection, IngestionQueue};
pub use recovery::{BatchReport, RecoveryError, RecoveryFailure, RecoveryOutcome, RecoveryService};

use overflow_store::{OverflowRecord, OverflowStats, OverflowStore, OverflowStoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// An event as submitted by a producer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source_system: String,
    /// Caller-chosen id; generated when absent
    #[serde(default)]
    pub event_id: Option<String>,
}

/// Where a submitted event ended up
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub event_id: String,
    pub status: SubmitStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow_stored: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evicted_event_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_event_id: Option<String>,
}

/// Detailed pipeline state for operators
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub processing: ProcessingState,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub metrics: MetricsSnapshot,
}

/// Caller-chosen ids whose submission is still in progress
#[derive(Default)]
struct SubmitReservations {
    ids: Mutex<HashSet<String>>,
}

impl SubmitReservations {
    /// `None` when another submission holds the id
    fn reserve(&self, event_id: &str) -> Option<IdReservation<'_>> {
        if !self.ids.lock().insert(event_id.to_string()) {
            return None;
        }
        Some(IdReservation { owner: self, event_id: event_id.to_string() })
    }
}

/// Releases the id when the submission finishes, whatever its outcome
struct IdReservation<'a> {
    owner: &'a SubmitReservations,
    event_id: String,
}

impl Drop for IdReservation<'_> {
    fn drop(&mut self) {
        self.owner.ids.lock().remove(&self.event_id);
    }
}

/// IngestionPipeline - the single entry point for producers and operators
///
/// One instance exists per process. It owns the bounded queue, the consumer
/// lifecycle and the recovery path, and shares the overflow store with them.
pub struct IngestionPipeline {
    config: PipelineConfig,
    queue: Arc<IngestionQueue>,
    store: Arc<dyn OverflowStore>,
    eviction: EvictionCoordinator,
    recovery: RecoveryService,
    lifecycle: LifecycleController,
    notifier: Notifier,
    metrics: Arc<PipelineMetrics>,
    reservations: SubmitReservations,
}

impl IngestionPipeline {
    /// Create a pipeline; the consumer is not started
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn OverflowStore>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        config.validate().map_err(PipelineError::Config)?;

        let metrics = Arc::new(PipelineMetrics::new());
        metrics.queue_capacity.set(config.queue_capacity as u64);

        let queue = Arc::new(IngestionQueue::new(config.queue_capacity));
        let notifier = Notifier::new(config.notification_capacity);

        let eviction = EvictionCoordinator::new(
            queue.clone(),
            store.clone(),
            notifier.clone(),
            metrics.clone(),
            config.drop_oldest_on_store_failure,
        );
        let recovery =
            RecoveryService::new(queue.clone(), store.clone(), config.recovery.clone(), metrics.clone());
        let lifecycle = LifecycleController::new(
            config.lifecycle.clone(),
            queue.clone(),
            store.clone(),
            handler,
            notifier.clone(),
            metrics.clone(),
        );

        tracing::info!("Ingestion pipeline created (queue capacity {})", config.queue_capacity);

        Ok(Self {
            config,
            queue,
            store,
            eviction,
            recovery,
            lifecycle,
            notifier,
            metrics,
            reservations: SubmitReservations::default(),
        })
    }

    /// Validate, classify and admit an event
    ///
    /// Invalid events are rejected before touching the queue or the store.
    /// A full queue triggers priority eviction, falling back to the overflow
    /// store. A caller-chosen id stays reserved until the event is placed,
    /// so concurrent submissions of one id cannot both succeed.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse> {
        self.metrics.events_submitted_total.inc();

        let (event, _reservation) = match self.build_event(request).await {
            Ok(built) => built,
            Err(e) => {
                self.metrics.events_rejected_total.inc();
                tracing::warn!("Rejected event: {}", e);
                return Err(e);
            }
        };

        let event_id = event.event_id.clone();
        let event_type = event.event_type;
        let priority = event.priority;

        let mut response = SubmitResponse {
            event_id: event_id.clone(),
            status: SubmitStatus::Queued,
            priority,
            overflow_stored: None,
            evicted_event_ids: Vec::new(),
            dropped_event_id: None,
        };

        match self.queue.try_enqueue(event) {
            Ok(()) => {
                self.metrics.events_queued_total.inc();
                tracing::debug!("Queued event {} ({}, {})", event_id, event_type, priority);
            }
            Err(EnqueueError::Duplicate(event)) => {
                self.metrics.events_rejected_total.inc();
                return Err(PipelineError::DuplicateEventId(event.event_id));
            }
            Err(EnqueueError::Full(event)) => {
                let report = self.eviction.admit(event).await?;
                response.evicted_event_ids = report.evicted;

                match report.outcome {
                    AdmissionOutcome::Admitted => {
                        self.metrics.events_queued_total.inc();
                    }
                    AdmissionOutcome::Overflowed => {
                        response.status = SubmitStatus::QueuedWithOverflow;
                        response.overflow_stored = Some(true);
                    }
                    AdmissionOutcome::Degraded { dropped_event_id } => {
                        self.metrics.events_queued_total.inc();
                        response.status = SubmitStatus::QueuedWithOverflow;
                        response.overflow_stored = Some(false);
                        response.dropped_event_id = dropped_event_id;
                    }
                }
            }
        }

        self.metrics.queue_depth.set(self.queue.size() as u64);
        self.notifier.event_submitted(&event_id, event_type, priority, response.status);

        Ok(response)
    }

    async fn build_event(&self, request: SubmitRequest) -> Result<(Event, Option<IdReservation<'_>>)> {
        let event_type: EventType = request.event_type.parse()?;

        let payload = match request.payload {
            serde_json::Value::Object(map) => map,
            _ => return Err(PipelineError::InvalidPayload("payload must be a JSON object".to_string())),
        };
        event::check_payload_size(&payload, self.config.max_payload_bytes)?;

        let (event_id, reservation) = match request.event_id {
            Some(event_id) => {
                event::validate_event_id(&event_id)?;
                let reservation = self
                    .reservations
                    .reserve(&event_id)
                    .ok_or_else(|| PipelineError::DuplicateEventId(event_id.clone()))?;
                self.ensure_unique(&event_id).await?;
                (event_id, Some(reservation))
            }
            None => (Event::generate_id(), None),
        };

        Ok((Event::new(event_id, event_type, request.source_system, payload), reservation))
    }

    async fn ensure_unique(&self, event_id: &str) -> Result<()> {
        if self.queue.contains(event_id) {
            return Err(PipelineError::DuplicateEventId(event_id.to_string()));
        }

        match self.store.get(event_id).await {
            Ok(Some(record)) if !record.processed => {
                Err(PipelineError::DuplicateEventId(event_id.to_string()))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    "Could not check overflow store for event id {}, accepting it: {}",
                    event_id,
                    e
                );
                Ok(())
            }
        }
    }

    /// List overflow records, newest first
    pub async fn list_overflow(
        &self,
        processed: Option<bool>,
        limit: usize,
    ) -> Result<Vec<OverflowRecord>> {
        Ok(self.store.list(processed, limit).await?)
    }

    /// Look up one overflow record
    pub async fn get_overflow(&self, event_id: &str) -> Result<OverflowRecord> {
        self.store
            .get(event_id)
            .await?
            .ok_or_else(|| OverflowStoreError::not_found(event_id).into())
    }

    pub async fn overflow_stats(&self) -> Result<OverflowStats> {
        Ok(self.store.stats().await?)
    }

    /// Replay a single overflow record into the queue
    pub async fn process_overflow_event(&self, event_id: &str) -> Result<RecoveryOutcome> {
        tracing::info!("Processing overflow event {}", event_id);
        let outcome = self.recovery.process_one(event_id).await?;
        self.metrics.queue_depth.set(self.queue.size() as u64);
        Ok(outcome)
    }

    /// Replay a bounded batch of pending overflow records
    pub async fn process_overflow_batch(&self, max_events: Option<usize>) -> Result<BatchReport> {
        let report = self.recovery.process_batch(max_events).await?;
        self.metrics.queue_depth.set(self.queue.size() as u64);
        Ok(report)
    }

    /// Delete processed overflow records older than `retention_age`
    pub async fn cleanup_overflow(&self, retention_age: Duration) -> Result<usize> {
        Ok(self.recovery.cleanup(retention_age).await?)
    }

    pub async fn start(&self) -> StartOutcome {
        self.lifecycle.start().await
    }

    pub async fn stop(&self) -> StopOutcome {
        self.lifecycle.stop().await
    }

    pub fn processing_state(&self) -> ProcessingState {
        self.lifecycle.state()
    }

    pub fn status(&self) -> PipelineStatus {
        self.metrics.queue_depth.set(self.queue.size() as u64);

        PipelineStatus {
            processing: self.lifecycle.state(),
            queue_size: self.queue.size(),
            queue_capacity: self.queue.capacity(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Receive pipeline notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineNotification> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &IngestionQueue {
        &self.queue
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Move every queued event into the overflow store
    ///
    /// The consumer must be stopped. Events the store refuses go back into
    /// the queue.
    pub async fn flush_to_overflow(&self) -> Result<usize> {
        if self.lifecycle.is_running() {
            return Err(PipelineError::InvalidState(
                "event processing must be stopped before flushing".to_string(),
            ));
        }

        let events = self.queue.drain();
        let total = events.len();
        let mut flushed = 0;

        for event in events {
            let stored = match event.to_overflow_record() {
                Ok(record) => self.store.insert(record).await.map_err(PipelineError::from),
                Err(e) => Err(e),
            };

            match stored {
                Ok(()) => {
                    flushed += 1;
                    self.metrics.events_overflowed_total.inc();
                    self.notifier.event_overflowed(&event, OverflowReason::ShutdownFlush);
                }
                Err(e) => {
                    self.metrics.overflow_store_failures.inc();
                    tracing::error!("Failed to flush event {} to overflow: {}", event.event_id, e);
                    if let Err(err) = self.queue.try_enqueue(event) {
                        tracing::error!("Event {} lost during flush", err.into_event().event_id);
                    }
                }
            }
        }

        self.metrics.queue_depth.set(self.queue.size() as u64);
        tracing::info!("Flushed {} of {} queued event(s) to overflow", flushed, total);

        Ok(flushed)
    }

    /// Stop the consumer and, when configured, persist the queue
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down ingestion pipeline");

        self.lifecycle.stop().await;

        if self.config.lifecycle.flush_on_shutdown {
            self.flush_to_overflow().await?;
        }

        Ok(())
    }
}
