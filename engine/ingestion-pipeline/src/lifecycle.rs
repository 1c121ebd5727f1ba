// Consumer lifecycle: start, graceful stop and forced cancellation

use chrono::{DateTime, Utc};
use overflow_store::OverflowStore;
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LifecycleConfig;
use crate::error::PipelineError;
use crate::event::Event;
use crate::handler::{EventHandler, HandlerError};
use crate::metrics::PipelineMetrics;
use crate::notification::{Notifier, OverflowReason, PipelineNotification};
use crate::queue::IngestionQueue;

/// Lifecycle phase of the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Stopped,
    Starting,
    Running,
    StopRequested,
}

/// Observable consumer state
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingState {
    pub phase: LifecyclePhase,
    pub active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_requested: bool,
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self { phase: LifecyclePhase::Stopped, active: false, start_time: None, stop_requested: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { start_time: DateTime<Utc> },
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// `graceful` is false when the consumer had to be cancelled
    Stopped { graceful: bool },
    AlreadyStopped,
}

/// Everything the consumer loop needs
#[derive(Clone)]
struct ConsumerContext {
    queue: Arc<IngestionQueue>,
    store: Arc<dyn OverflowStore>,
    handler: Arc<dyn EventHandler>,
    notifier: Notifier,
    metrics: Arc<PipelineMetrics>,
}

struct ConsumerTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    in_flight: Arc<SyncMutex<Option<Event>>>,
}

/// Serializes start and stop of the single consumer task
///
/// The transition lock is held only while starting or stopping; the state
/// can be read at any time without it.
pub struct LifecycleController {
    config: LifecycleConfig,
    context: ConsumerContext,
    transition: Mutex<Option<ConsumerTask>>,
    state: RwLock<ProcessingState>,
}

impl LifecycleController {
    pub fn new(
        config: LifecycleConfig,
        queue: Arc<IngestionQueue>,
        store: Arc<dyn OverflowStore>,
        handler: Arc<dyn EventHandler>,
        notifier: Notifier,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            config,
            context: ConsumerContext { queue, store, handler, notifier, metrics },
            transition: Mutex::new(None),
            state: RwLock::new(ProcessingState::default()),
        }
    }

    pub fn state(&self) -> ProcessingState {
        self.state.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.read().active
    }

    /// Start the consumer; a no-op when it is already running
    pub async fn start(&self) -> StartOutcome {
        let mut slot = self.transition.lock().await;

        if slot.is_some() {
            tracing::info!("Event processing already running");
            return StartOutcome::AlreadyRunning;
        }

        self.state.write().phase = LifecyclePhase::Starting;

        let cancel = CancellationToken::new();
        let in_flight = Arc::new(SyncMutex::new(None));
        let handle = tokio::spawn(run_consumer(self.context.clone(), cancel.clone(), in_flight.clone()));
        *slot = Some(ConsumerTask { handle, cancel, in_flight });

        let start_time = Utc::now();
        *self.state.write() = ProcessingState {
            phase: LifecyclePhase::Running,
            active: true,
            start_time: Some(start_time),
            stop_requested: false,
        };

        self.context.notifier.publish(PipelineNotification::ProcessingStarted { start_time });
        tracing::info!("Event processing started");

        StartOutcome::Started { start_time }
    }

    /// Stop the consumer; a no-op when it is not running
    ///
    /// Waits up to `stop_timeout` for the current event to finish, then
    /// cancels the task and hands any in-flight event back to the queue head,
    /// or to the overflow store when the queue has refilled.
    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.transition.lock().await;

        let Some(mut task) = slot.take() else {
            tracing::info!("Event processing already stopped");
            return StopOutcome::AlreadyStopped;
        };

        {
            let mut state = self.state.write();
            state.phase = LifecyclePhase::StopRequested;
            state.stop_requested = true;
        }

        tracing::info!("Stopping event processing");
        task.cancel.cancel();

        let graceful = match tokio::time::timeout(self.config.stop_timeout, &mut task.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("Consumer task failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Consumer did not stop within {:?}, cancelling it",
                    self.config.stop_timeout
                );
                task.handle.abort();
                let _ = (&mut task.handle).await;
                false
            }
        };

        let in_flight = task.in_flight.lock().take();
        if let Some(event) = in_flight {
            self.context.return_to_source(event).await;
        }

        *self.state.write() = ProcessingState::default();

        self.context
            .notifier
            .publish(PipelineNotification::ProcessingStopped { graceful, timestamp: Utc::now() });
        tracing::info!("Event processing stopped (graceful: {})", graceful);

        StopOutcome::Stopped { graceful }
    }
}

async fn run_consumer(
    context: ConsumerContext,
    cancel: CancellationToken,
    in_flight: Arc<SyncMutex<Option<Event>>>,
) {
    tracing::debug!("Consumer loop running");

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = context.queue.dequeue() => event,
        };

        context.metrics.queue_depth.set(context.queue.size() as u64);
        *in_flight.lock() = Some(event.clone());

        let started = Instant::now();
        let result = context.handler.handle(&event).await;
        context.metrics.handler_latency.record(started.elapsed().as_nanos() as u64);

        match result {
            Ok(()) => {
                in_flight.lock().take();
                context.metrics.events_processed_total.inc();
            }
            Err(e) => {
                context.metrics.handler_failures_total.inc();
                tracing::warn!("Handler failed for event {}: {}", event.event_id, e);
                context.park_failed(&event, &e, &in_flight).await;
            }
        }
    }

    tracing::debug!("Consumer loop exited");
}

impl ConsumerContext {
    async fn store_with_reason(&self, event: &Event, reason: OverflowReason) -> Result<(), PipelineError> {
        self.store.insert(event.to_overflow_record()?).await?;
        self.metrics.events_overflowed_total.inc();
        self.notifier.event_overflowed(event, reason);
        Ok(())
    }

    /// Keep a failed event replayable
    ///
    /// `in_flight` is cleared as soon as the record is stored, so a forced
    /// stop during the retry update cannot also restore the event to the queue.
    async fn park_failed(
        &self,
        event: &Event,
        error: &HandlerError,
        in_flight: &SyncMutex<Option<Event>>,
    ) {
        let stored = self.store_with_reason(event, OverflowReason::HandlerFailed).await;
        in_flight.lock().take();

        if let Err(e) = stored {
            self.metrics.overflow_store_failures.inc();
            self.metrics.events_dropped_total.inc();
            tracing::error!(
                "Event {} lost: handler failed ({}) and it could not be parked: {}",
                event.event_id,
                error,
                e
            );
            return;
        }

        match self.store.increment_retry(&event.event_id, &error.to_string()).await {
            Ok(_) => tracing::info!("Parked failed event {} in overflow", event.event_id),
            Err(e) => {
                self.metrics.overflow_store_failures.inc();
                tracing::warn!(
                    "Parked failed event {} but could not record the retry: {}",
                    event.event_id,
                    e
                );
            }
        }
    }

    /// Hand an interrupted event back to the queue head or the overflow store
    async fn return_to_source(&self, event: Event) {
        let event = match self.queue.try_restore_front(event) {
            Ok(()) => {
                tracing::info!("Returned in-flight event to the queue head");
                return;
            }
            Err(e) => e.into_event(),
        };

        match self.store_with_reason(&event, OverflowReason::ForcedStop).await {
            Ok(()) => tracing::info!("Stored in-flight event {} in overflow", event.event_id),
            Err(e) => {
                self.metrics.overflow_store_failures.inc();
                self.metrics.events_dropped_total.inc();
                tracing::error!("In-flight event {} lost on forced stop: {}", event.event_id, e);
            }
        }
    }
}
