use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Result, ToolError};

/// Token-bucket limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Sustained rate in requests per second.
    pub per_second: f64,
    /// Burst capacity.
    pub burst: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            per_second: 5.0,
            burst: 10,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-key token buckets; keys are hosts or tool names.
///
/// `acquire` waits until a token is available instead of failing, so a
/// burst of concurrent calls spreads out over time rather than erroring.
#[derive(Debug)]
pub struct HostRateLimiter {
    limit: RateLimit,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl HostRateLimiter {
    pub fn new(limit: RateLimit) -> Arc<Self> {
        Arc::new(Self {
            limit,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// Wait for one token for `key`. Cancellation aborts the wait.
    pub async fn acquire(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().expect("rate limiter poisoned");
                let now = Instant::now();
                let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
                    tokens: self.limit.burst as f64,
                    last_refill: now,
                });

                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens =
                    (bucket.tokens + elapsed * self.limit.per_second).min(self.limit.burst as f64);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    // Time until one full token accumulates.
                    Some(Duration::from_secs_f64(
                        (1.0 - bucket.tokens) / self.limit.per_second,
                    ))
                }
            };

            match wait {
                None => return Ok(()),
                Some(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ToolError::cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
