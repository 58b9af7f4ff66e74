use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{CancelReason, Cost, Perspective, PlanNode, Report, SessionId};

/// One streamed progress event.
///
/// Progress events are ephemeral: they feed subscribers (REPL panels, the
/// vault sink, tests) and are never persisted. The durable record is the
/// domain-event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchEvent {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ProgressPayload,
}

impl ResearchEvent {
    pub fn new(session_id: SessionId, payload: ProgressPayload) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Closed taxonomy of progress events.
///
/// `EventKind` exists separately from `ProgressPayload` so subscribers can
/// filter by kind without matching on payload contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ResearchStarted,
    PlanCreated,
    WorkerStarted,
    WorkerProgress,
    WorkerCompleted,
    WorkerFailed,
    LlmChunk,
    IterationStarted,
    ToolCall,
    ToolResult,
    AnalysisStarted,
    AnalysisProgress,
    AnalysisComplete,
    CrossValidationStarted,
    CrossValidationProgress,
    CrossValidationComplete,
    GapFillingStarted,
    GapFillingProgress,
    GapFillingComplete,
    SynthesisStarted,
    SynthesisProgress,
    SynthesisComplete,
    ReportGenerated,
    CostUpdated,
    ResearchCompleted,
    ResearchFailed,
    ResearchCancelled,
}

/// Typed payloads for the taxonomy above.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ProgressPayload {
    ResearchStarted {
        query: String,
    },
    PlanCreated {
        topic: String,
        perspectives: Vec<Perspective>,
        nodes: Vec<PlanNode>,
    },
    WorkerStarted {
        worker: u32,
        objective: String,
    },
    WorkerProgress {
        worker: u32,
        message: String,
    },
    WorkerCompleted {
        worker: u32,
        fact_count: usize,
        source_count: usize,
    },
    WorkerFailed {
        worker: u32,
        error: String,
    },
    /// One streamed LLM delta, tagged with the worker it belongs to.
    LlmChunk {
        worker: Option<u32>,
        scope: String,
        text: String,
        done: bool,
    },
    IterationStarted {
        worker: u32,
        iteration: u32,
    },
    ToolCall {
        /// Correlates the matching `ToolResult`.
        call_id: Uuid,
        tool: String,
        args: Value,
        worker: Option<u32>,
    },
    ToolResult {
        call_id: Uuid,
        tool: String,
        ok: bool,
        summary: String,
    },
    AnalysisStarted {},
    AnalysisProgress {
        stage: String,
    },
    AnalysisComplete {
        validated: usize,
        contradictions: usize,
        gaps: usize,
    },
    CrossValidationStarted {
        fact_count: usize,
    },
    CrossValidationProgress {
        checked: usize,
        total: usize,
    },
    CrossValidationComplete {
        supported: usize,
        weak: usize,
        unsupported: usize,
    },
    GapFillingStarted {
        gap_count: usize,
    },
    GapFillingProgress {
        gap_index: usize,
        description: String,
    },
    GapFillingComplete {
        new_facts: usize,
    },
    SynthesisStarted {},
    SynthesisProgress {
        section: String,
        written: usize,
        total: usize,
    },
    SynthesisComplete {
        section_count: usize,
    },
    ReportGenerated {
        report: Report,
    },
    CostUpdated {
        scope: String,
        increment: Cost,
        total: Cost,
    },
    ResearchCompleted {
        duration_ms: i64,
        source_count: usize,
        cost: Cost,
    },
    ResearchFailed {
        error_kind: String,
        message: String,
        failed_phase: String,
    },
    ResearchCancelled {
        reason: CancelReason,
    },
}

impl ProgressPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ResearchStarted { .. } => EventKind::ResearchStarted,
            Self::PlanCreated { .. } => EventKind::PlanCreated,
            Self::WorkerStarted { .. } => EventKind::WorkerStarted,
            Self::WorkerProgress { .. } => EventKind::WorkerProgress,
            Self::WorkerCompleted { .. } => EventKind::WorkerCompleted,
            Self::WorkerFailed { .. } => EventKind::WorkerFailed,
            Self::LlmChunk { .. } => EventKind::LlmChunk,
            Self::IterationStarted { .. } => EventKind::IterationStarted,
            Self::ToolCall { .. } => EventKind::ToolCall,
            Self::ToolResult { .. } => EventKind::ToolResult,
            Self::AnalysisStarted {} => EventKind::AnalysisStarted,
            Self::AnalysisProgress { .. } => EventKind::AnalysisProgress,
            Self::AnalysisComplete { .. } => EventKind::AnalysisComplete,
            Self::CrossValidationStarted { .. } => EventKind::CrossValidationStarted,
            Self::CrossValidationProgress { .. } => EventKind::CrossValidationProgress,
            Self::CrossValidationComplete { .. } => EventKind::CrossValidationComplete,
            Self::GapFillingStarted { .. } => EventKind::GapFillingStarted,
            Self::GapFillingProgress { .. } => EventKind::GapFillingProgress,
            Self::GapFillingComplete { .. } => EventKind::GapFillingComplete,
            Self::SynthesisStarted {} => EventKind::SynthesisStarted,
            Self::SynthesisProgress { .. } => EventKind::SynthesisProgress,
            Self::SynthesisComplete { .. } => EventKind::SynthesisComplete,
            Self::ReportGenerated { .. } => EventKind::ReportGenerated,
            Self::CostUpdated { .. } => EventKind::CostUpdated,
            Self::ResearchCompleted { .. } => EventKind::ResearchCompleted,
            Self::ResearchFailed { .. } => EventKind::ResearchFailed,
            Self::ResearchCancelled { .. } => EventKind::ResearchCancelled,
        }
    }
}

/// Anything that accepts progress events.
///
/// The runtime's event bus is the canonical implementation; agents and
/// tools only ever see this trait so they stay decoupled from the bus.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ResearchEvent);
}

/// Sink that discards everything. Useful default for tests and one-off
/// engine operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ResearchEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_payload() {
        let event = ResearchEvent::new(
            SessionId::new(),
            ProgressPayload::WorkerStarted {
                worker: 2,
                objective: "safety perspective".to_string(),
            },
        );
        assert_eq!(event.kind(), EventKind::WorkerStarted);
    }

    #[test]
    fn payload_serializes_tagged() {
        let event = ResearchEvent::new(
            SessionId::new(),
            ProgressPayload::ResearchCancelled {
                reason: CancelReason::Timeout,
            },
        );
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "research_cancelled");
        assert_eq!(json["data"]["reason"], "timeout");
    }

    #[test]
    fn tool_events_correlate_by_call_id() {
        let call_id = Uuid::new_v4();
        let call = ProgressPayload::ToolCall {
            call_id,
            tool: "search".to_string(),
            args: serde_json::json!({"query": "x"}),
            worker: Some(1),
        };
        let result = ProgressPayload::ToolResult {
            call_id,
            tool: "search".to_string(),
            ok: true,
            summary: "5 results".to_string(),
        };
        match (call, result) {
            (
                ProgressPayload::ToolCall { call_id: a, .. },
                ProgressPayload::ToolResult { call_id: b, .. },
            ) => assert_eq!(a, b),
            _ => unreachable!(),
        }
    }
}
