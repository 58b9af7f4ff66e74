use serde::{Deserialize, Serialize};

/// Token and dollar accounting for a session, worker or single call.
///
/// Costs are monotonically additive: the runtime only ever folds more usage
/// in, never subtracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Cost {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_usd: f64,
}

impl Cost {
    pub fn new(input_tokens: u64, output_tokens: u64, total_usd: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_usd,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &Cost) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_usd += other.total_usd;
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.total_usd == 0.0
    }
}

/// One usage increment, attributed to a named scope such as
/// `"search/2/iter-1"` or `"synthesis/outline"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub scope: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageSample {
    pub fn new(scope: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            scope: scope.into(),
            input_tokens,
            output_tokens,
        }
    }
}
