use seeker_types::CancelReason;

/// Result type for seeker-runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("agent error: {0}")]
    Agent(#[from] seeker_agents::Error),

    #[error("engine error: {0}")]
    Engine(#[from] seeker_engine::Error),

    #[error("llm error: {0}")]
    Llm(#[from] seeker_llm::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Every search branch failed; there is nothing to synthesize from.
    #[error("no search worker completed")]
    NoSearchSucceeded,

    /// Synthesis failure fails the whole run.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// A worker exceeded its deadline; retried like a transient failure.
    #[error("worker timed out")]
    WorkerTimeout,

    #[error("research cancelled: {0}")]
    Cancelled(CancelReason),
}

impl Error {
    /// The error-kind tag carried by `WorkerFailed`/`ResearchFailed`
    /// events.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::Agent(err) if err.is_cancelled() => "cancelled",
            Self::Agent(seeker_agents::Error::Malformed(_)) => "malformed_response",
            Self::Agent(_) => "agent",
            Self::Engine(seeker_engine::Error::BudgetExhausted { .. }) => "resource_exhausted",
            Self::Engine(seeker_engine::Error::ConcurrencyConflict { .. }) => "fatal",
            Self::Engine(_) => "fatal",
            Self::Llm(seeker_llm::Error::Cancelled) => "cancelled",
            Self::Llm(seeker_llm::Error::MalformedResponse(_)) => "malformed_response",
            Self::Llm(_) => "transient",
            Self::Config(_) => "fatal",
            Self::NoSearchSucceeded => "resource_exhausted",
            Self::SynthesisFailed(_) => "fatal",
            Self::WorkerTimeout => "transient",
            Self::Cancelled(_) => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
            || matches!(self, Self::Agent(err) if err.is_cancelled())
            || matches!(self, Self::Llm(seeker_llm::Error::Cancelled))
    }
}
