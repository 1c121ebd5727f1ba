// Event model: types, priorities and the overflow record mapping

use chrono::{DateTime, Utc};
use overflow_store::OverflowRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::classifier::PriorityClassifier;
use crate::error::PipelineError;

/// Structured event payload
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Maximum length of an event id
pub const MAX_EVENT_ID_LEN: usize = 128;

/// The fixed set of accepted event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FraudDetection,
    ComplianceCheck,
    RiskAssessment,
    TransactionMonitoring,
    DocumentAnalysis,
    Alert,
    SecurityBreach,
    SystemFailure,
    RegulatoryViolation,
    TransactionFailure,
    ComplianceAlert,
    RiskThresholdExceeded,
    PerformanceDegradation,
    OperationalAlert,
}

impl EventType {
    pub const ALL: [EventType; 14] = [
        EventType::FraudDetection,
        EventType::ComplianceCheck,
        EventType::RiskAssessment,
        EventType::TransactionMonitoring,
        EventType::DocumentAnalysis,
        EventType::Alert,
        EventType::SecurityBreach,
        EventType::SystemFailure,
        EventType::RegulatoryViolation,
        EventType::TransactionFailure,
        EventType::ComplianceAlert,
        EventType::RiskThresholdExceeded,
        EventType::PerformanceDegradation,
        EventType::OperationalAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FraudDetection => "fraud_detection",
            EventType::ComplianceCheck => "compliance_check",
            EventType::RiskAssessment => "risk_assessment",
            EventType::TransactionMonitoring => "transaction_monitoring",
            EventType::DocumentAnalysis => "document_analysis",
            EventType::Alert => "alert",
            EventType::SecurityBreach => "security_breach",
            EventType::SystemFailure => "system_failure",
            EventType::RegulatoryViolation => "regulatory_violation",
            EventType::TransactionFailure => "transaction_failure",
            EventType::ComplianceAlert => "compliance_alert",
            EventType::RiskThresholdExceeded => "risk_threshold_exceeded",
            EventType::PerformanceDegradation => "performance_degradation",
            EventType::OperationalAlert => "operational_alert",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownEventType(s.to_string()))
    }
}

/// Event priority; a lower value is more urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl Priority {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.value()
    }
}

impl TryFrom<u8> for Priority {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Critical),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Medium),
            4 => Ok(Priority::Low),
            other => Err(PipelineError::InvalidPriority(other)),
        }
    }
}

/// An ingested event
///
/// Events are values: once built they are moved between the queue, the
/// overflow store and the consumer, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source_system: String,
    pub payload: Payload,
    pub priority: Priority,
}

impl Event {
    /// Build a new event, classifying its priority
    pub fn new(
        event_id: impl Into<String>,
        event_type: EventType,
        source_system: impl Into<String>,
        payload: Payload,
    ) -> Self {
        let priority = PriorityClassifier::classify(event_type, &payload);

        Self {
            event_id: event_id.into(),
            event_type,
            timestamp: Utc::now(),
            source_system: source_system.into(),
            payload,
            priority,
        }
    }

    /// Generate a fresh event id
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Serialize into a fresh overflow record
    pub fn to_overflow_record(&self) -> Result<OverflowRecord, PipelineError> {
        let data = serde_json::to_string(&self.payload)
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;

        Ok(OverflowRecord::new(
            self.event_id.clone(),
            self.event_type.as_str(),
            self.priority.value(),
            self.timestamp,
            self.source_system.clone(),
            data,
        ))
    }

    /// Reconstruct an event from its overflow record
    ///
    /// The stored priority is kept as-is; events are not re-classified on
    /// replay.
    pub fn from_overflow_record(record: &OverflowRecord) -> Result<Self, PipelineError> {
        let event_type = record.event_type.parse::<EventType>()?;
        let priority = Priority::try_from(record.priority)?;
        let payload: Payload = serde_json::from_str(&record.data)
            .map_err(|e| PipelineError::InvalidPayload(format!("stored payload: {e}")))?;

        Ok(Self {
            event_id: record.event_id.clone(),
            event_type,
            timestamp: record.timestamp,
            source_system: record.source_system.clone(),
            payload,
            priority,
        })
    }
}

/// Validate a caller-supplied event id
pub fn validate_event_id(event_id: &str) -> Result<(), PipelineError> {
    if event_id.trim().is_empty() {
        return Err(PipelineError::InvalidEventId("event id must not be empty".to_string()));
    }

    if event_id.len() > MAX_EVENT_ID_LEN {
        return Err(PipelineError::InvalidEventId(format!(
            "event id exceeds {MAX_EVENT_ID_LEN} characters"
        )));
    }

    if event_id.chars().any(char::is_control) {
        return Err(PipelineError::InvalidEventId(
            "event id must not contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Check a payload against the serialized size limit; returns its size
pub fn check_payload_size(payload: &Payload, max_bytes: usize) -> Result<usize, PipelineError> {
    let size = serde_json::to_vec(payload)
        .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?
        .len();

    if size > max_bytes {
        return Err(PipelineError::PayloadTooLarge { size, max: max_bytes });
    }

    Ok(size)
}
