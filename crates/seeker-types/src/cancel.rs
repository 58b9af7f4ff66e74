use serde::{Deserialize, Serialize};

/// Why a session was cancelled.
///
/// Cancellation is a terminal state, not an error: agents flush whatever
/// partial results they accumulated before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The user interrupted the run (Ctrl-C or explicit cancel).
    UserInterrupt,
    /// A per-call, per-worker or per-session deadline elapsed.
    Timeout,
    /// The owning task was itself cancelled.
    ParentCancelled,
    /// The process is shutting down.
    Shutdown,
    #[default]
    Unknown,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInterrupt => "user interrupt",
            Self::Timeout => "timeout",
            Self::ParentCancelled => "parent cancelled",
            Self::Shutdown => "shutdown",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
