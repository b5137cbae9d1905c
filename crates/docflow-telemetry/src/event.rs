//! Structured pipeline events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobStarted,
    StageCompleted,
    JobCompleted,
    JobFailed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::JobStarted => "job_started",
            Self::StageCompleted => "stage_completed",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
        };
        write!(f, "{kind}")
    }
}

/// One emitted pipeline event
///
/// Every event carries the identifiers needed to stitch a job's history
/// back together from the collector alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: EventKind,
    pub job_id: Uuid,
    pub tenant_id: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form metrics map (`duration_ms`, `items_processed`, stage name,
    /// error kind, ...)
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl TelemetryEvent {
    /// Event stamped with the current wall clock
    pub fn new(kind: EventKind, job_id: Uuid, tenant_id: &str, correlation_id: &str) -> Self {
        Self {
            kind,
            job_id,
            tenant_id: tenant_id.to_string(),
            correlation_id: correlation_id.to_string(),
            timestamp: Utc::now(),
            metrics: serde_json::Map::new(),
        }
    }

    /// Attach one metric
    pub fn with_metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_kind() {
        let event = TelemetryEvent::new(
            EventKind::StageCompleted,
            Uuid::new_v4(),
            "tenant-a",
            "corr-1",
        )
        .with_metric("stage", "fetch")
        .with_metric("items_processed", 3);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "stage_completed");
        assert_eq!(json["metrics"]["items_processed"], 3);
        assert_eq!(json["tenant_id"], "tenant-a");
    }
}
