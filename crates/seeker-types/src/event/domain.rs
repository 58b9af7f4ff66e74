use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CancelReason, Cost, Fact, Perspective, PlanNode, Report, SessionId};

// NOTE: Durable event schema
//
// State = fold(events). Everything a session snapshot contains must be
// derivable from this enum alone; the reducer in seeker-engine is the single
// place that interprets it. Renaming a variant or field is a breaking change
// to every log on disk, which is why payloads carry full values (facts,
// reports) rather than references into runtime state.

/// Domain events recorded in a session's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    ResearchStarted(ResearchStartedPayload),
    PlanCreated(PlanCreatedPayload),
    WorkerStarted(WorkerStartedPayload),
    WorkerCompleted(WorkerCompletedPayload),
    WorkerFailed(WorkerFailedPayload),
    ReportGenerated(ReportGeneratedPayload),
    ResearchCompleted(ResearchCompletedPayload),
    ResearchFailed(ResearchFailedPayload),
    ResearchCancelled(ResearchCancelledPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchStartedPayload {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCreatedPayload {
    pub topic: String,
    pub perspectives: Vec<Perspective>,
    /// Snapshot of the task graph at plan time.
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStartedPayload {
    /// 1-based worker number.
    pub worker: u32,
    pub objective: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCompletedPayload {
    pub worker: u32,
    pub output: String,
    pub sources: Vec<String>,
    pub facts: Vec<Fact>,
    pub cost: Cost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFailedPayload {
    pub worker: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGeneratedPayload {
    pub report: Report,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchCompletedPayload {
    pub duration_ms: i64,
    pub source_count: usize,
    pub cost: Cost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchFailedPayload {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchCancelledPayload {
    pub reason: CancelReason,
}

/// Durable envelope around one domain event.
///
/// One JSON line per record. `version` is 1-based and strictly increasing
/// per aggregate; ordering within a session file is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub aggregate_id: SessionId,
    pub version: u64,
    #[serde(rename = "timestamp_iso8601", with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

impl EventRecord {
    pub fn new(
        aggregate_id: SessionId,
        version: u64,
        timestamp: DateTime<Utc>,
        event: SessionEvent,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            version,
            timestamp,
            event,
        }
    }
}

/// UTC ISO-8601 timestamps with millisecond precision.
mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}
