// Error types for the ingestion pipeline

use overflow_store::OverflowStoreError;
use thiserror::Error;

use crate::recovery::RecoveryError;

/// Errors surfaced by the ingestion pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Payload is {size} bytes, exceeding the limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid event id: {0}")]
    InvalidEventId(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(u8),

    #[error("Event {0} is already queued or pending in overflow")]
    DuplicateEventId(String),

    #[error("System at capacity: event {event_id} could not be queued or stored")]
    AtCapacity { event_id: String },

    #[error("Overflow store error: {0}")]
    Store(#[from] OverflowStoreError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    /// Whether the error is a synchronous rejection of the submitted event
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::UnknownEventType(_)
                | PipelineError::InvalidPayload(_)
                | PipelineError::PayloadTooLarge { .. }
                | PipelineError::InvalidEventId(_)
                | PipelineError::InvalidPriority(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
