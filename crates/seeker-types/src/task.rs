use serde::{Deserialize, Serialize};

/// Research depth.
///
/// `Fast` collapses the plan to Root → Search → Synthesize with a single
/// perspective; `Deep` runs the full multi-perspective pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Fast,
    #[default]
    Deep,
}

/// Arena-style task node identifier, assigned by the graph.
///
/// Sessions, workers and nodes reference each other through these stable
/// integer ids instead of owning pointers, so no reference cycles exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of work a task node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Synthetic entry node every plan starts from.
    Root,
    /// One search branch for one perspective.
    Search,
    /// Cross-validation over the union of all search facts.
    CrossValidate,
    /// Orchestrator-driven gap-filling sub-phase.
    FillGaps,
    /// Outline + sectioned report writing.
    Synthesize,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Search => "search",
            Self::CrossValidate => "cross_validate",
            Self::FillGaps => "fill_gaps",
            Self::Synthesize => "synthesize",
        }
    }
}

/// Execution status of a task node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    /// All dependencies complete; eligible for dispatch.
    Ready,
    Running,
    Complete,
    Failed,
}

/// Type-tagged result payload stored on a completed task node.
///
/// A node exclusively owns its payload once it transitions to `Complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    /// Root nodes complete without producing anything.
    Empty,
    Search(crate::SearchOutcome),
    Analysis(crate::AnalysisResult),
    GapFill(crate::GapFillOutcome),
    Report(crate::Report),
}

/// Serializable view of one plan node, embedded in `PlanCreated` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub kind: TaskKind,
    pub description: String,
    /// Ids of nodes that must be complete before this one runs.
    #[serde(default)]
    pub depends_on: Vec<NodeId>,
}
