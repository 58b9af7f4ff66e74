use serde::Deserialize;
use serde_json::Value;

use seeker_types::{
    Cost, Fact, PlanCreatedPayload, Perspective, ReportGeneratedPayload, ResearchCompletedPayload,
    ResearchFailedPayload, ResearchStartedPayload, SessionEvent, SessionId,
    WorkerCompletedPayload, WorkerFailedPayload, WorkerStartedPayload,
};

use crate::{Error, Result};

// NOTE: Legacy format
//
// Before event sourcing, a session was stored as one mutable JSON snapshot.
// The migrator projects known snapshot fields into the canonical sequence
//   started -> plan -> worker-started -> worker-completed/failed
//   -> report-generated -> completed/failed
// Unknown fields are ignored; the snapshot itself is left untouched.

/// Snapshot-shaped session as written by the pre-event-sourcing runtime.
#[derive(Debug, Deserialize)]
pub struct LegacySession {
    #[serde(alias = "session_id")]
    pub id: SessionId,
    pub query: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub workers: Vec<LegacyWorker>,
    #[serde(default)]
    pub report: Option<seeker_types::Report>,
    #[serde(default)]
    pub cost: Cost,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyWorker {
    #[serde(default)]
    pub number: Option<u32>,
    pub objective: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub cost: Cost,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse a legacy snapshot, tolerating unknown fields.
pub fn parse_legacy(value: &Value) -> Result<LegacySession> {
    serde_json::from_value(value.clone()).map_err(|e| Error::InvalidLegacy(e.to_string()))
}

/// Project a legacy snapshot into its canonical event sequence.
pub fn migrate_legacy_value(value: &Value) -> Result<(SessionId, Vec<SessionEvent>)> {
    let legacy = parse_legacy(value)?;
    let mut events = Vec::new();

    events.push(SessionEvent::ResearchStarted(ResearchStartedPayload {
        query: legacy.query.clone(),
    }));

    if !legacy.workers.is_empty() {
        let perspectives = legacy
            .workers
            .iter()
            .map(|w| Perspective {
                name: w.objective.clone(),
                focus: w.objective.clone(),
                questions: Vec::new(),
            })
            .collect();
        events.push(SessionEvent::PlanCreated(PlanCreatedPayload {
            topic: legacy.query.clone(),
            perspectives,
            nodes: Vec::new(),
        }));
    }

    let mut source_count = 0usize;
    for (index, worker) in legacy.workers.iter().enumerate() {
        let number = worker.number.unwrap_or(index as u32 + 1);
        events.push(SessionEvent::WorkerStarted(WorkerStartedPayload {
            worker: number,
            objective: worker.objective.clone(),
        }));

        if worker.status == "failed" {
            events.push(SessionEvent::WorkerFailed(WorkerFailedPayload {
                worker: number,
                error: worker
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }));
        } else {
            source_count += worker.sources.len();
            events.push(SessionEvent::WorkerCompleted(WorkerCompletedPayload {
                worker: number,
                output: worker.output.clone().unwrap_or_default(),
                sources: worker.sources.clone(),
                facts: worker.facts.clone(),
                cost: worker.cost.clone(),
            }));
        }
    }

    if let Some(report) = legacy.report.clone() {
        events.push(SessionEvent::ReportGenerated(ReportGeneratedPayload {
            report,
        }));
    }

    match legacy.status.as_str() {
        "failed" => events.push(SessionEvent::ResearchFailed(ResearchFailedPayload {
            error: legacy
                .error
                .unwrap_or_else(|| "unknown failure".to_string()),
        })),
        // Anything non-failed that got persisted is treated as complete;
        // the legacy runtime only wrote snapshots at the end of a run.
        _ => events.push(SessionEvent::ResearchCompleted(ResearchCompletedPayload {
            duration_ms: legacy.duration_ms.unwrap_or(0),
            source_count,
            cost: legacy.cost,
        })),
    }

    Ok((legacy.id, events))
}
