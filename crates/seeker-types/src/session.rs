use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Cost, Fact};

/// Opaque session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a research session.
///
/// A session reaches a terminal status (`Complete`, `Failed`, `Cancelled`)
/// at most once and is immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Execution status of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
}

/// One executed agent instance (search, analysis or synthesis).
///
/// Worker numbers are 1-based and stable within a session: worker N keeps
/// its number even when workers launched after it finish first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// 1-based worker number, stable within the session.
    pub number: u32,
    /// What this worker was asked to do (perspective focus, gap, section).
    pub objective: String,
    pub status: WorkerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Cost attributed to this worker's LLM and tool calls.
    #[serde(default)]
    pub cost: Cost,
    /// Final textual output, if the worker produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Source URLs this worker consulted.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Facts this worker confirmed.
    #[serde(default)]
    pub facts: Vec<Fact>,
    /// Error message for failed workers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Worker {
    pub fn new(number: u32, objective: impl Into<String>) -> Self {
        Self {
            number,
            objective: objective.into(),
            status: WorkerStatus::Pending,
            started_at: None,
            completed_at: None,
            cost: Cost::default(),
            output: None,
            sources: Vec::new(),
            facts: Vec::new(),
            error: None,
        }
    }
}

/// Snapshot of one research session, reconstructed from its event log.
///
/// Snapshots carry no write authority: mutating a snapshot does not touch
/// the durable log. The orchestrator owns the session while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// The original user query.
    pub query: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Workers ordered by worker number.
    #[serde(default)]
    pub workers: Vec<Worker>,
    /// Deduplicated source URLs accumulated across workers.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Final report, present once `ReportGenerated` was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<crate::Report>,
    /// Aggregated cost across all workers and orchestrator-level calls.
    #[serde(default)]
    pub cost: Cost,
    /// Failure message for failed sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Log version used for optimistic concurrency on append.
    /// Strictly increasing, 1-based; 0 means "no events yet".
    #[serde(default)]
    pub version: u64,
}

impl Session {
    pub fn new(id: SessionId, query: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            query: query.into(),
            status: SessionStatus::Pending,
            created_at,
            completed_at: None,
            workers: Vec::new(),
            sources: Vec::new(),
            report: None,
            cost: Cost::default(),
            error: None,
            version: 0,
        }
    }

    pub fn worker(&self, number: u32) -> Option<&Worker> {
        self.workers.iter().find(|w| w.number == number)
    }

    pub fn worker_mut(&mut self, number: u32) -> Option<&mut Worker> {
        self.workers.iter_mut().find(|w| w.number == number)
    }

    /// Summary line statistics for listing and end-of-run display.
    pub fn stats(&self) -> SessionStats {
        let facts = self.workers.iter().map(|w| w.facts.len()).sum();
        let duration_seconds = self
            .completed_at
            .map(|end| (end - self.created_at).num_seconds())
            .unwrap_or(0);
        SessionStats {
            worker_count: self.workers.len(),
            fact_count: facts,
            source_count: self.sources.len(),
            duration_seconds,
            cost: self.cost.clone(),
        }
    }
}

/// Aggregated statistics for one session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionStats {
    pub worker_count: usize,
    pub fact_count: usize,
    pub source_count: usize,
    pub duration_seconds: i64,
    pub cost: Cost,
}
