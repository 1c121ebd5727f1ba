// Downstream event handlers driven by the consumer loop

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::Event;

/// Failure reported by a downstream handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives every event the consumer dequeues
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Handler that only logs each event
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        tracing::info!(
            "Processed event {} ({}, priority {}, source {})",
            event.event_id,
            event.event_type,
            event.priority,
            event.source_system
        );
        Ok(())
    }
}

/// Handler that forwards events to a bounded channel
///
/// A full channel suspends the consumer; a closed channel is a failure.
#[derive(Debug, Clone)]
pub struct ChannelEventHandler {
    sender: mpsc::Sender<Event>,
}

impl ChannelEventHandler {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventHandler for ChannelEventHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| HandlerError::new("downstream channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, Payload};

    #[tokio::test]
    async fn test_channel_handler_forwards() {
        let (tx, mut rx) = mpsc::channel(1);
        let handler = ChannelEventHandler::new(tx);

        let event = Event::new("evt-1", EventType::Alert, "tests", Payload::new());
        handler.handle(&event).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event_id, "evt-1");
    }

    #[tokio::test]
    async fn test_channel_handler_fails_when_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handler = ChannelEventHandler::new(tx);

        let event = Event::new("evt-1", EventType::Alert, "tests", Payload::new());
        assert!(handler.handle(&event).await.is_err());
    }
}
