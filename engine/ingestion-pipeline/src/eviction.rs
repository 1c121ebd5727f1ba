// Priority eviction for a full ingestion queue

use overflow_store::OverflowStore;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::event::Event;
use crate::metrics::PipelineMetrics;
use crate::notification::{Notifier, OverflowReason};
use crate::queue::{EnqueueError, HeadInspection, IngestionQueue};

/// Upper bound on head events examined for a single admission
pub const MAX_EVICTION_INSPECTIONS: usize = 3;

/// How an event that met a full queue was placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Queued after lower-priority events were evicted
    Admitted,
    /// Written to the overflow store
    Overflowed,
    /// Overflow store unavailable; queued by dropping the oldest event
    Degraded { dropped_event_id: Option<String> },
}

/// Result of a single admission attempt
#[derive(Debug, Clone)]
pub struct EvictionReport {
    pub outcome: AdmissionOutcome,
    /// Head events examined (never more than `MAX_EVICTION_INSPECTIONS`)
    pub inspected: usize,
    /// Ids removed from the queue to make room
    pub evicted: Vec<String>,
}

enum VictimFate {
    Stored,
    Restored,
    Dropped,
}

/// Makes room for urgent events when the queue is full
///
/// Only the first few head events are candidates. An event is evicted only
/// when it is strictly less urgent than the incoming one; the first
/// candidate that is not stays at the head and ends the scan.
pub struct EvictionCoordinator {
    queue: Arc<IngestionQueue>,
    store: Arc<dyn OverflowStore>,
    notifier: Notifier,
    metrics: Arc<PipelineMetrics>,
    drop_oldest_on_store_failure: bool,
}

impl EvictionCoordinator {
    pub fn new(
        queue: Arc<IngestionQueue>,
        store: Arc<dyn OverflowStore>,
        notifier: Notifier,
        metrics: Arc<PipelineMetrics>,
        drop_oldest_on_store_failure: bool,
    ) -> Self {
        Self { queue, store, notifier, metrics, drop_oldest_on_store_failure }
    }

    /// Place an event that found the queue full
    pub async fn admit(&self, event: Event) -> Result<EvictionReport, PipelineError> {
        let budget = self.queue.size().min(MAX_EVICTION_INSPECTIONS);
        let mut inspected = 0;
        let mut evicted = Vec::new();

        while inspected < budget && self.queue.is_full() {
            match self.queue.inspect_head(|head| head.priority > event.priority) {
                HeadInspection::Empty => break,
                HeadInspection::Retained => {
                    inspected += 1;
                    break;
                }
                HeadInspection::Evicted(victim) => {
                    inspected += 1;
                    let victim_id = victim.event_id.clone();
                    match self.evict(victim, &event).await {
                        VictimFate::Stored | VictimFate::Dropped => evicted.push(victim_id),
                        VictimFate::Restored => break,
                    }
                }
            }
        }

        // Room was made, or the queue drained before anything was inspected
        if !evicted.is_empty() || inspected == 0 {
            match self.queue.try_enqueue(event) {
                Ok(()) => {
                    tracing::info!(
                        "Admitted event after evicting {} event(s) ({} inspected)",
                        evicted.len(),
                        inspected
                    );
                    return Ok(EvictionReport {
                        outcome: AdmissionOutcome::Admitted,
                        inspected,
                        evicted,
                    });
                }
                Err(EnqueueError::Full(event)) => {
                    tracing::debug!("Freed slot taken by a concurrent producer");
                    return self.overflow_incoming(event, inspected, evicted).await;
                }
                Err(EnqueueError::Duplicate(event)) => {
                    return Err(PipelineError::DuplicateEventId(event.event_id));
                }
            }
        }

        self.overflow_incoming(event, inspected, evicted).await
    }

    async fn evict(&self, victim: Event, incoming: &Event) -> VictimFate {
        match self.persist(&victim, OverflowReason::Evicted).await {
            Ok(()) => {
                self.metrics.events_evicted_total.inc();
                tracing::info!(
                    "Evicted event {} (priority {}) to overflow for event {} (priority {})",
                    victim.event_id,
                    victim.priority,
                    incoming.event_id,
                    incoming.priority
                );
                VictimFate::Stored
            }
            Err(e) => {
                tracing::warn!("Failed to store evicted event {}: {}", victim.event_id, e);
                match self.queue.try_restore_front(victim) {
                    Ok(()) => VictimFate::Restored,
                    Err(err) => {
                        let lost = err.into_event();
                        self.metrics.events_dropped_total.inc();
                        tracing::error!(
                            "Event {} lost: queue refilled and overflow store unavailable",
                            lost.event_id
                        );
                        VictimFate::Dropped
                    }
                }
            }
        }
    }

    async fn overflow_incoming(
        &self,
        event: Event,
        inspected: usize,
        evicted: Vec<String>,
    ) -> Result<EvictionReport, PipelineError> {
        match self.persist(&event, OverflowReason::QueueFull).await {
            Ok(()) => {
                tracing::info!(
                    "Queue full: event {} (priority {}) stored in overflow",
                    event.event_id,
                    event.priority
                );
                Ok(EvictionReport { outcome: AdmissionOutcome::Overflowed, inspected, evicted })
            }
            Err(e) => {
                tracing::error!("Failed to store event {} in overflow: {}", event.event_id, e);

                if !self.drop_oldest_on_store_failure {
                    return Err(PipelineError::AtCapacity { event_id: event.event_id });
                }

                let event_id = event.event_id.clone();
                let dropped = self
                    .queue
                    .force_admit(event)
                    .map_err(|err| PipelineError::DuplicateEventId(err.into_event().event_id))?;

                if let Some(dropped) = &dropped {
                    self.metrics.events_dropped_total.inc();
                    tracing::error!(
                        "Dropped oldest queued event {} to admit event {}",
                        dropped.event_id,
                        event_id
                    );
                }

                Ok(EvictionReport {
                    outcome: AdmissionOutcome::Degraded {
                        dropped_event_id: dropped.map(|e| e.event_id),
                    },
                    inspected,
                    evicted,
                })
            }
        }
    }

    async fn persist(&self, event: &Event, reason: OverflowReason) -> Result<(), PipelineError> {
        let record = event.to_overflow_record()?;

        if let Err(e) = self.store.insert(record).await {
            self.metrics.overflow_store_failures.inc();
            return Err(e.into());
        }

        self.metrics.events_overflowed_total.inc();
        self.notifier.event_overflowed(event, reason);
        Ok(())
    }
}
