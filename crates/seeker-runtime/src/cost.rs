use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use seeker_llm::{Pricing, TokenUsage, UsageHook};
use seeker_types::{Cost, EventSink, ProgressPayload, ResearchEvent, SessionId, UsageSample};

/// Session-wide cost aggregation.
///
/// Every LLM usage callback lands here; each increment is published as
/// `CostUpdated`. Per-scope totals let worker costs be carved out of the
/// session total by scope prefix (`"search/2/"`).
pub struct CostTracker {
    pricing: Pricing,
    sink: Arc<dyn EventSink>,
    session_id: SessionId,
    state: Mutex<CostState>,
}

#[derive(Default)]
struct CostState {
    total: Cost,
    by_scope: BTreeMap<String, Cost>,
}

impl CostTracker {
    pub fn new(session_id: SessionId, pricing: Pricing, sink: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self {
            pricing,
            sink,
            session_id,
            state: Mutex::new(CostState::default()),
        })
    }

    /// Fold one usage sample in and publish the increment.
    pub fn record(&self, sample: UsageSample) {
        let usage = TokenUsage {
            input_tokens: sample.input_tokens,
            output_tokens: sample.output_tokens,
        };
        let increment = Cost::new(
            sample.input_tokens,
            sample.output_tokens,
            self.pricing.cost_usd(usage),
        );

        let total = {
            let mut state = self.state.lock().expect("cost lock poisoned");
            state.total.add(&increment);
            state
                .by_scope
                .entry(sample.scope.clone())
                .or_default()
                .add(&increment);
            state.total.clone()
        };

        self.sink.emit(ResearchEvent::new(
            self.session_id,
            ProgressPayload::CostUpdated {
                scope: sample.scope,
                increment,
                total,
            },
        ));
    }

    pub fn total(&self) -> Cost {
        self.state.lock().expect("cost lock poisoned").total.clone()
    }

    /// Aggregated cost of every scope starting with `prefix`.
    pub fn cost_for_prefix(&self, prefix: &str) -> Cost {
        let state = self.state.lock().expect("cost lock poisoned");
        let mut cost = Cost::default();
        for (scope, c) in state.by_scope.iter() {
            if scope.starts_with(prefix) {
                cost.add(c);
            }
        }
        cost
    }

    /// The hook handed to the LLM client at construction.
    pub fn usage_hook(self: &Arc<Self>) -> UsageHook {
        let tracker = self.clone();
        Arc::new(move |sample: UsageSample| tracker.record(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeker_types::NullSink;

    #[test]
    fn totals_accumulate_monotonically() {
        let tracker = CostTracker::new(SessionId::new(), Pricing::default(), Arc::new(NullSink));
        tracker.record(UsageSample::new("search/1/iter-1", 1000, 100));
        tracker.record(UsageSample::new("search/2/iter-1", 500, 50));

        let total = tracker.total();
        assert_eq!(total.input_tokens, 1500);
        assert_eq!(total.output_tokens, 150);
        assert!(total.total_usd > 0.0);
    }

    #[test]
    fn prefix_carves_out_worker_cost() {
        let tracker = CostTracker::new(SessionId::new(), Pricing::default(), Arc::new(NullSink));
        tracker.record(UsageSample::new("search/1/iter-1", 100, 10));
        tracker.record(UsageSample::new("search/1/facts", 200, 20));
        tracker.record(UsageSample::new("search/12/iter-1", 999, 99));

        let worker_one = tracker.cost_for_prefix("search/1/");
        assert_eq!(worker_one.input_tokens, 300);
        assert_eq!(worker_one.output_tokens, 30);
    }
}
