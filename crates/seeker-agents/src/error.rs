/// Result type for seeker-agents operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while an agent runs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("llm error: {0}")]
    Llm(#[from] seeker_llm::Error),

    #[error("tool error: {0}")]
    Tool(#[from] seeker_tools::ToolError),

    /// A structured response stayed malformed after the repair retry.
    #[error("malformed structured response: {0}")]
    Malformed(String),

    /// A report section kept failing after its retries.
    #[error("section `{section}` failed: {reason}")]
    SectionFailed { section: String, reason: String },

    #[error("agent cancelled")]
    Cancelled,
}

impl Error {
    /// Cancellation is a terminal state, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
            || matches!(self, Self::Llm(seeker_llm::Error::Cancelled))
            || matches!(
                self,
                Self::Tool(seeker_tools::ToolError {
                    kind: seeker_tools::ToolErrorKind::Cancelled,
                    ..
                })
            )
    }
}
