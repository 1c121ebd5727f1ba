//! # Overflow Store
//!
//! Durable storage for events that the bounded ingestion queue could not hold,
//! either because they were evicted in favour of a more urgent event or because
//! no room could be made for them.
//!
//! ## Architecture
//!
//! - **OverflowStore**: Abstract trait for storage backends
//! - **LocalOverflowStore**: File-per-record implementation with atomic replace
//! - **InMemoryOverflowStore**: Non-durable implementation for tests
//! - **OverflowRecord**: The persisted record layout
//!
//! ## Usage
//!
//! ```rust
//! use overflow_store::{create_local_store, OverflowRecord, OverflowStore};
//! use tempfile::TempDir;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let store = create_local_store(temp_dir.path())?;
//!
//!     let record = OverflowRecord::new(
//!         "evt-1",
//!         "fraud_detection",
//!         1,
//!         overflow_store::Utc::now(),
//!         "payments",
//!         r#"{"amount": 1200}"#,
//!     );
//!     store.insert(record).await?;
//!
//!     let pending = store.list_pending(10).await?;
//!     assert_eq!(pending.len(), 1);
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod local;
pub mod record;

pub use backend::{InMemoryOverflowStore, OverflowStore};
pub use config::{OverflowStoreConfig, RetentionConfig};
pub use error::{OverflowStoreError, Result};
pub use local::{create_local_store, create_local_store_with_config, LocalOverflowStore};
pub use record::{OverflowRecord, OverflowStats};

/// Re-export common types for convenience
pub use chrono::{DateTime, Utc};
