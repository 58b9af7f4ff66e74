use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Uniform tool contract.
///
/// Tools take and return JSON so the ReAct loop can pass model-produced
/// arguments through unchanged. Schema validation happens inside `invoke`;
/// a mismatch is an `InvalidArgs` error, not a panic.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema fragment for the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Rate-limiter key for a call with these arguments.
    ///
    /// Defaults to the tool name; tools that hit arbitrary hosts (fetch)
    /// override this with the target host so one slow site cannot starve
    /// the rest.
    fn rate_key(&self, _args: &Value) -> String {
        self.name().to_string()
    }

    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> Result<Value>;
}

/// Extract a required string argument.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| crate::ToolError::invalid_args(format!("missing required argument `{key}`")))
}

/// Extract an optional positive integer argument with a default.
pub(crate) fn optional_usize(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
