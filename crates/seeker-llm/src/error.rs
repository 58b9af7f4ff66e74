use std::time::Duration;

/// Result type for seeker-llm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur when talking to an LLM provider.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Provider returned 429; retried with backoff up to the policy cap.
    #[error("rate limited by provider{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The prompt does not fit the model's context window. Fatal for the
    /// call; the context manager is responsible for preventing this.
    #[error("prompt exceeds the model context window: {0}")]
    ContextOverflow(String),

    /// Transport failure or 5xx; retried with backoff.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered but the body did not match the expected shape.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// The call was cancelled. Terminal state, not a failure.
    #[error("call cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the retry policy applies to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ProviderUnavailable(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::ProviderUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::ProviderUnavailable(err.to_string())
        }
    }
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}ms)", d.as_millis()),
        None => String::new(),
    }
}
