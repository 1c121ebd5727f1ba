// Fire-and-forget pipeline notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::event::{Event, EventType, Priority};

/// Why an event ended up in the overflow store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowReason {
    /// Evicted from the queue head to admit a more urgent event
    Evicted,
    /// No room could be made in the queue
    QueueFull,
    /// The downstream handler failed
    HandlerFailed,
    /// In flight when the consumer was cancelled
    ForcedStop,
    /// Still queued at shutdown
    ShutdownFlush,
}

/// Outcome of a submit as reported to callers and subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Queued,
    QueuedWithOverflow,
    Rejected,
}

/// Structured notification emitted by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineNotification {
    EventSubmitted {
        event_id: String,
        event_type: EventType,
        priority: Priority,
        status: SubmitStatus,
        timestamp: DateTime<Utc>,
    },
    EventOverflowed {
        event_id: String,
        event_type: EventType,
        priority: Priority,
        reason: OverflowReason,
        timestamp: DateTime<Utc>,
    },
    ProcessingStarted {
        start_time: DateTime<Utc>,
    },
    ProcessingStopped {
        graceful: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast sink for notifications
///
/// Sending never blocks and never fails the caller; with no subscribers the
/// notification is simply dropped.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<PipelineNotification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineNotification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notification: PipelineNotification) {
        if self.sender.send(notification).is_err() {
            tracing::trace!("No notification subscribers");
        }
    }

    pub fn event_submitted(&self, event_id: &str, event_type: EventType, priority: Priority, status: SubmitStatus) {
        self.publish(PipelineNotification::EventSubmitted {
            event_id: event_id.to_string(),
            event_type,
            priority,
            status,
            timestamp: Utc::now(),
        });
    }

    pub fn event_overflowed(&self, event: &Event, reason: OverflowReason) {
        self.publish(PipelineNotification::EventOverflowed {
            event_id: event.event_id.clone(),
            event_type: event.event_type,
            priority: event.priority,
            reason,
            timestamp: Utc::now(),
        });
    }
}
