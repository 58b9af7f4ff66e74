use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use seeker_types::{EventSink, NullSink, ProgressPayload, ResearchEvent, SessionId};

use crate::{HostRateLimiter, RateLimit, Result, Tool, ToolError, ToolErrorKind};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(20);

/// Static description of one registered tool, for prompt construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Uniform entry point for tool invocation.
///
/// Applies, in order: registration lookup, `ToolCall` event, per-host rate
/// limiting, the per-call timeout, then the tool itself, then the matching
/// `ToolResult` event. Every call/result pair shares one correlation id.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    limiter: Arc<HostRateLimiter>,
    timeout: Duration,
    sink: Arc<dyn EventSink>,
    session_id: SessionId,
}

impl ToolRegistry {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            tools: HashMap::new(),
            limiter: HostRateLimiter::new(RateLimit::default()),
            timeout: DEFAULT_TOOL_TIMEOUT,
            sink: Arc::new(NullSink),
            session_id,
        }
    }

    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.limiter = HostRateLimiter::new(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    /// Descriptors of all registered tools, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut specs: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invoke `name` with `args`, attributing events to `worker`.
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        worker: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::new(ToolErrorKind::UnknownTool, format!("no tool `{name}`")))?
            .clone();

        let call_id = Uuid::new_v4();
        self.sink.emit(ResearchEvent::new(
            self.session_id,
            ProgressPayload::ToolCall {
                call_id,
                tool: name.to_string(),
                args: args.clone(),
                worker,
            },
        ));

        let outcome = self.run_limited(&tool, args, cancel).await;

        let (ok, summary) = match &outcome {
            Ok(value) => (true, summarize_output(value)),
            Err(err) => (false, err.to_string()),
        };
        self.sink.emit(ResearchEvent::new(
            self.session_id,
            ProgressPayload::ToolResult {
                call_id,
                tool: name.to_string(),
                ok,
                summary,
            },
        ));

        outcome
    }

    async fn run_limited(
        &self,
        tool: &Arc<dyn Tool>,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let rate_key = tool.rate_key(&args);
        self.limiter.acquire(&rate_key, cancel).await?;

        match tokio::time::timeout(self.timeout, tool.invoke(args, cancel)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ToolError::timeout(format!(
                "`{}` exceeded {}s",
                tool.name(),
                self.timeout.as_secs()
            ))),
        }
    }
}

/// One-line summary of a tool's output for the `ToolResult` event.
fn summarize_output(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("{} items", items.len()),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                format!("{} chars", text.len())
            } else {
                format!("{} fields", map.len())
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo args back"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, args: Value, _cancel: &CancellationToken) -> Result<Value> {
            Ok(args)
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps forever"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, _args: Value, _cancel: &CancellationToken) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ResearchEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: ResearchEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_typed_error() {
        let registry = ToolRegistry::new(SessionId::new());
        let err = registry
            .invoke("nope", json!({}), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::UnknownTool);
    }

    #[tokio::test]
    async fn call_and_result_events_share_correlation_id() {
        let sink = Arc::new(RecordingSink::default());
        let registry = ToolRegistry::new(SessionId::new())
            .with_sink(sink.clone())
            .register(Arc::new(EchoTool));

        registry
            .invoke("echo", json!({"x": 1}), Some(3), &CancellationToken::new())
            .await
            .unwrap();

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        let call_id_a = match &events[0].payload {
            ProgressPayload::ToolCall { call_id, worker, .. } => {
                assert_eq!(*worker, Some(3));
                *call_id
            }
            other => panic!("expected ToolCall, got {other:?}"),
        };
        match &events[1].payload {
            ProgressPayload::ToolResult { call_id, ok, .. } => {
                assert_eq!(*call_id, call_id_a);
                assert!(ok);
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_produces_timeout_error_and_result_event() {
        let sink = Arc::new(RecordingSink::default());
        let registry = ToolRegistry::new(SessionId::new())
            .with_sink(sink.clone())
            .with_timeout(Duration::from_millis(50))
            .register(Arc::new(SlowTool));

        let err = registry
            .invoke("slow", json!({}), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Timeout);

        let events = sink.0.lock().unwrap();
        match &events[1].payload {
            ProgressPayload::ToolResult { ok, .. } => assert!(!ok),
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn descriptors_are_sorted() {
        let registry = ToolRegistry::new(SessionId::new())
            .register(Arc::new(SlowTool))
            .register(Arc::new(EchoTool));
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "slow"]);
    }
}
