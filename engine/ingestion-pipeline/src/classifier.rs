// Priority classification for incoming events

use crate::event::{EventType, Payload, Priority};

/// Event types that are always critical
const CRITICAL_TYPES: [EventType; 3] =
    [EventType::SecurityBreach, EventType::SystemFailure, EventType::RegulatoryViolation];

/// Event types that are always high priority
const HIGH_TYPES: [EventType; 3] = [
    EventType::TransactionFailure,
    EventType::ComplianceAlert,
    EventType::RiskThresholdExceeded,
];

/// Event types that are always medium priority
const MEDIUM_TYPES: [EventType; 2] =
    [EventType::PerformanceDegradation, EventType::OperationalAlert];

/// Payload keywords that escalate an otherwise unclassified event to critical
const CRITICAL_KEYWORDS: [&str; 5] = ["breach", "failure", "violation", "critical", "urgent"];

/// Stateless priority classifier
pub struct PriorityClassifier;

impl PriorityClassifier {
    /// Derive the priority of an event from its type and payload
    pub fn classify(event_type: EventType, payload: &Payload) -> Priority {
        if CRITICAL_TYPES.contains(&event_type) {
            return Priority::Critical;
        }
        if HIGH_TYPES.contains(&event_type) {
            return Priority::High;
        }
        if MEDIUM_TYPES.contains(&event_type) {
            return Priority::Medium;
        }

        // Keys and values both count
        let text = serde_json::to_string(payload).unwrap_or_default().to_lowercase();
        if CRITICAL_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
            return Priority::Critical;
        }

        Priority::Low
    }
}
