//! Error types for the overflow store

use thiserror::Error;

/// Result type alias for overflow store operations
pub type Result<T> = std::result::Result<T, OverflowStoreError>;

/// Errors that can occur in the overflow store
#[derive(Error, Debug)]
pub enum OverflowStoreError {
    /// I/O errors (record files, directories)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record on disk could not be interpreted
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// No record exists for the given event id
    #[error("Overflow record not found: {0}")]
    NotFound(String),

    /// The record is not acceptable for storage
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Generic error with context
    #[error("Overflow store error: {0}")]
    Generic(String),
}

impl OverflowStoreError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(event_id: impl Into<String>) -> Self {
        Self::NotFound(event_id.into())
    }

    /// Create a new invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create a new generic error
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Whether the error means the record simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
