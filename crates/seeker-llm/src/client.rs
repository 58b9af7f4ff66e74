use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use seeker_types::UsageSample;

use crate::{ChatMessage, Result};

/// JSON-schema description of one callable tool, passed to providers that
/// support function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-schema fragment for the tool's arguments.
    pub parameters: Value,
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Model name; empty means the client's default.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Tool schemas for function calling.
    pub tools: Vec<ToolSchema>,
    /// JSON-schema fragment for constrained structured output.
    pub response_schema: Option<Value>,
    /// Cost attribution scope, e.g. `"search/2/iter-1"`.
    pub scope: String,
}

impl ChatOptions {
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other,
}

impl FinishReason {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

/// Token usage reported by the provider for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    pub arguments: Value,
}

/// Completed chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
}

/// One streamed delta.
///
/// A stream is a finite sequence of chunks ending with `done = true`; it is
/// not rewindable, only a fresh call can be issued.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub text: String,
    pub done: bool,
}

/// Callback receiving streamed deltas.
pub type ChunkHandler<'a> = &'a mut (dyn FnMut(StreamChunk) + Send);

/// Hook receiving per-call token usage, registered by the orchestrator.
pub type UsageHook = Arc<dyn Fn(UsageSample) + Send + Sync>;

/// Chat client contract.
///
/// Implementations retry `RateLimited` and `ProviderUnavailable` internally
/// with bounded exponential backoff; all other errors are fatal for the
/// call. Cancellation must be observed at every await point.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse>;

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        cancel: &CancellationToken,
        on_chunk: ChunkHandler<'_>,
    ) -> Result<ChatResponse>;

    /// Default model name used when `ChatOptions::model` is empty.
    fn default_model(&self) -> &str;
}
