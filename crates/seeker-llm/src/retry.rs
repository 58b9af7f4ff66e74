use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Bounded exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    /// Total attempts, including the first.
    pub max_tries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2,
            cap: Duration::from_secs(30),
            max_tries: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before attempt `attempt` (0-based; attempt 0 has none).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.factor.saturating_pow(attempt - 1);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Run `op` under the retry policy, sleeping between attempts.
///
/// Only errors with `is_retryable() == true` are retried; a provider-sent
/// `retry_after` overrides the computed backoff. Cancellation during the
/// sleep aborts with `Error::Cancelled`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_tries => {
                let delay = match &err {
                    Error::RateLimited {
                        retry_after: Some(after),
                    } => (*after).min(policy.cap),
                    _ => policy.delay_for(attempt + 1),
                };
                tracing::debug!(attempt, ?delay, error = %err, "retrying LLM call");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
