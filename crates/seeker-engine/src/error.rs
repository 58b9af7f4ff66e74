use seeker_types::NodeId;

/// Result type for seeker-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the state layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Optimistic concurrency check failed on append. Fatal for that
    /// write; there is no implicit rebase.
    #[error("concurrency conflict: expected version {expected}, log is at {actual}")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    /// The event log violates its own invariants (gap in versions, first
    /// event not ResearchStarted, unparseable line).
    #[error("corrupt session log: {0}")]
    CorruptLog(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The migrator refuses sessions that already have events.
    #[error("session already has events; migration refused")]
    AlreadyMigrated,

    /// Legacy snapshot could not be interpreted.
    #[error("invalid legacy session: {0}")]
    InvalidLegacy(String),

    /// Adding this edge would create a cycle.
    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("unknown task node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} exhausted its retries")]
    RetriesExhausted(NodeId),

    /// Over the token budget with nothing left to fold.
    #[error("context budget exhausted: {usage} tokens against budget {budget}")]
    BudgetExhausted { usage: usize, budget: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
