//! Overflow record layout
//!
//! Field names are part of the persisted format and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// An event that could not be held in the ingestion queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverflowRecord {
    /// Unique event identifier (record key)
    pub event_id: String,

    /// Event type name
    pub event_type: String,

    /// Priority tier, 1 (most urgent) to 4
    pub priority: u8,

    /// When the event was created
    pub timestamp: DateTime<Utc>,

    /// Free-text origin label
    pub source_system: String,

    /// Serialized JSON payload
    pub data: String,

    /// When the event entered overflow
    pub created_at: DateTime<Utc>,

    /// Set once the event has been re-admitted to the queue
    #[serde(default)]
    pub processed: bool,

    /// Number of failed re-admission attempts
    #[serde(default)]
    pub retry_count: u32,

    /// Last failure reason
    #[serde(default)]
    pub error_message: Option<String>,
}

impl OverflowRecord {
    /// Create a fresh, unprocessed record entering overflow now
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        priority: u8,
        timestamp: DateTime<Utc>,
        source_system: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            priority,
            timestamp,
            source_system: source_system.into(),
            data: data.into(),
            created_at: Utc::now(),
            processed: false,
            retry_count: 0,
            error_message: None,
        }
    }

    /// Pending records first by priority, then oldest event first
    pub fn pending_order(a: &OverflowRecord, b: &OverflowRecord) -> Ordering {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.event_id.cmp(&b.event_id))
    }

    /// Listing order for admin views: newest overflow entries first
    pub fn newest_first(a: &OverflowRecord, b: &OverflowRecord) -> Ordering {
        b.created_at.cmp(&a.created_at).then_with(|| a.event_id.cmp(&b.event_id))
    }
}

/// Aggregate statistics over the overflow store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowStats {
    /// Total records stored
    pub total: usize,

    /// Records awaiting re-admission
    pub pending: usize,

    /// Records already re-admitted
    pub processed: usize,

    /// Pending records per priority tier
    pub by_priority_pending: BTreeMap<u8, usize>,
}

impl OverflowStats {
    /// Accumulate statistics from a set of records
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OverflowRecord>) -> Self {
        let mut stats = OverflowStats::default();

        for record in records {
            stats.total += 1;
            if record.processed {
                stats.processed += 1;
            } else {
                stats.pending += 1;
                *stats.by_priority_pending.entry(record.priority).or_insert(0) += 1;
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, priority: u8, age_secs: i64) -> OverflowRecord {
        OverflowRecord::new(
            id,
            "alert",
            priority,
            Utc::now() - Duration::seconds(age_secs),
            "tests",
            "{}",
        )
    }

    #[test]
    fn test_pending_order_priority_then_age() {
        let mut records = vec![
            record("low-old", 4, 100),
            record("crit-new", 1, 1),
            record("crit-old", 1, 50),
            record("high", 2, 10),
        ];

        records.sort_by(OverflowRecord::pending_order);

        let ids: Vec<_> = records.iter().map(|r| r.event_id.as_str()).collect();
        assert_eq!(ids, vec!["crit-old", "crit-new", "high", "low-old"]);
    }

    #[test]
    fn test_persisted_field_names() {
        let value = serde_json::to_value(record("evt-1", 2, 0)).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "event_id",
            "event_type",
            "priority",
            "timestamp",
            "source_system",
            "data",
            "created_at",
            "processed",
            "retry_count",
            "error_message",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }
        assert_eq!(object["priority"], serde_json::json!(2));
        assert_eq!(object["processed"], serde_json::json!(false));
        assert_eq!(object["retry_count"], serde_json::json!(0));
        assert!(object["error_message"].is_null());
    }

    #[test]
    fn test_missing_optional_fields_take_defaults() {
        let json = r#"{
            "event_id": "evt-9",
            "event_type": "alert",
            "priority": 3,
            "timestamp": "2024-01-01T00:00:00Z",
            "source_system": "legacy",
            "data": "{}",
            "created_at": "2024-01-01T00:00:01Z"
        }"#;

        let record: OverflowRecord = serde_json::from_str(json).unwrap();
        assert!(!record.processed);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn test_stats_from_records() {
        let mut done = record("done", 1, 0);
        done.processed = true;
        let records = vec![record("a", 1, 0), record("b", 4, 0), record("c", 4, 0), done];

        let stats = OverflowStats::from_records(&records);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.by_priority_pending.get(&1), Some(&1));
        assert_eq!(stats.by_priority_pending.get(&4), Some(&2));
    }
}
