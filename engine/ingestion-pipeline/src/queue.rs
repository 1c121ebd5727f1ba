// Bounded MPSC ingestion queue

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tokio::sync::Notify;

use crate::event::Event;

/// Why an event could not be enqueued; the event is handed back
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("queue is full")]
    Full(Event),

    #[error("event id is already queued")]
    Duplicate(Event),
}

impl EnqueueError {
    pub fn into_event(self) -> Event {
        match self {
            EnqueueError::Full(event) | EnqueueError::Duplicate(event) => event,
        }
    }
}

/// Result of examining the head of the queue
#[derive(Debug)]
pub enum HeadInspection {
    /// The head event was removed
    Evicted(Event),
    /// The head event stays where it was
    Retained,
    /// Nothing to inspect
    Empty,
}

/// Bounded FIFO between producers and the single consumer
///
/// - Any number of producers call `try_enqueue`, which never suspends
/// - One consumer calls `dequeue`, which suspends while the queue is empty
/// - Ids of queued events are tracked so the same id is never queued twice
pub struct IngestionQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    available: Notify,
}

struct QueueInner {
    events: VecDeque<Event>,
    ids: HashSet<String>,
}

impl QueueInner {
    fn pop_front(&mut self) -> Option<Event> {
        let event = self.events.pop_front()?;
        self.ids.remove(&event.event_id);
        Some(event)
    }
}

impl IngestionQueue {
    /// Create a queue holding at most `capacity` events (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::with_capacity(capacity),
                ids: HashSet::with_capacity(capacity),
            }),
            capacity,
            available: Notify::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().events.len() >= self.capacity
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.inner.lock().ids.contains(event_id)
    }

    /// Ids in queue order, head first
    pub fn event_ids(&self) -> Vec<String> {
        self.inner.lock().events.iter().map(|e| e.event_id.clone()).collect()
    }

    /// Append an event at the tail without waiting
    pub fn try_enqueue(&self, event: Event) -> Result<(), EnqueueError> {
        {
            let mut inner = self.inner.lock();
            if inner.ids.contains(&event.event_id) {
                return Err(EnqueueError::Duplicate(event));
            }
            if inner.events.len() >= self.capacity {
                return Err(EnqueueError::Full(event));
            }

            inner.ids.insert(event.event_id.clone());
            inner.events.push_back(event);
        }

        self.available.notify_one();
        Ok(())
    }

    /// Take the head event if there is one
    pub fn try_dequeue(&self) -> Option<Event> {
        self.inner.lock().pop_front()
    }

    /// Wait for the next event
    ///
    /// Cancel safe: dropping the future never loses an event.
    pub async fn dequeue(&self) -> Event {
        loop {
            let notified = self.available.notified();
            if let Some(event) = self.try_dequeue() {
                return event;
            }
            notified.await;
        }
    }

    /// Examine the head event and remove it only if `evict` says so
    ///
    /// Decision and removal happen in one critical section, so a retained
    /// event keeps its place at the head.
    pub fn inspect_head<F>(&self, evict: F) -> HeadInspection
    where
        F: FnOnce(&Event) -> bool,
    {
        let mut inner = self.inner.lock();

        let should_evict = match inner.events.front() {
            Some(head) => evict(head),
            None => return HeadInspection::Empty,
        };

        if !should_evict {
            return HeadInspection::Retained;
        }

        match inner.pop_front() {
            Some(event) => HeadInspection::Evicted(event),
            None => HeadInspection::Empty,
        }
    }

    /// Put an event back at the head if there is room
    pub fn try_restore_front(&self, event: Event) -> Result<(), EnqueueError> {
        {
            let mut inner = self.inner.lock();
            if inner.ids.contains(&event.event_id) {
                return Err(EnqueueError::Duplicate(event));
            }
            if inner.events.len() >= self.capacity {
                return Err(EnqueueError::Full(event));
            }

            inner.ids.insert(event.event_id.clone());
            inner.events.push_front(event);
        }

        self.available.notify_one();
        Ok(())
    }

    /// Append an event, dropping the oldest queued event if the queue is full
    ///
    /// Returns the dropped event. Used only when the overflow store cannot
    /// take an event.
    pub fn force_admit(&self, event: Event) -> Result<Option<Event>, EnqueueError> {
        let dropped = {
            let mut inner = self.inner.lock();
            if inner.ids.contains(&event.event_id) {
                return Err(EnqueueError::Duplicate(event));
            }

            let dropped =
                if inner.events.len() >= self.capacity { inner.pop_front() } else { None };

            inner.ids.insert(event.event_id.clone());
            inner.events.push_back(event);
            dropped
        };

        self.available.notify_one();
        Ok(dropped)
    }

    /// Remove every queued event, head first
    pub fn drain(&self) -> Vec<Event> {
        let mut inner = self.inner.lock();
        inner.ids.clear();
        inner.events.drain(..).collect()
    }
}

/// Admission seam used by overflow recovery
///
/// Recovery only ever re-admits into free space; it never evicts.
pub trait EventAdmission: Send + Sync {
    fn admit(&self, event: Event) -> Result<(), EnqueueError>;

    fn size(&self) -> usize;

    fn capacity(&self) -> usize;
}

impl EventAdmission for IngestionQueue {
    fn admit(&self, event: Event) -> Result<(), EnqueueError> {
        self.try_enqueue(event)
    }

    fn size(&self) -> usize {
        IngestionQueue::size(self)
    }

    fn capacity(&self) -> usize {
        IngestionQueue::capacity(self)
    }
}
