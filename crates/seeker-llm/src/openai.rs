use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;
use seeker_types::UsageSample;

use crate::{
    ChatClient, ChatMessage, ChatOptions, ChatResponse, ChunkHandler, Error, FinishReason, Result,
    RetryPolicy, StreamChunk, TokenUsage, ToolInvocation, UsageHook, with_retry,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-million-token pricing used for `total_usd` attribution.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub input_usd_per_mtok: f64,
    pub output_usd_per_mtok: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        // OpenRouter mid-tier default; overridden from config.
        Self {
            input_usd_per_mtok: 1.0,
            output_usd_per_mtok: 3.0,
        }
    }
}

impl Pricing {
    pub fn cost_usd(&self, usage: TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_usd_per_mtok
            + usage.output_tokens as f64 * self.output_usd_per_mtok)
            / 1_000_000.0
    }
}

/// Chat client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    retry: RetryPolicy,
    pricing: Pricing,
    usage_hook: Option<UsageHook>,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            retry: RetryPolicy::default(),
            pricing: Pricing::default(),
            usage_hook: None,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Register the hook that receives per-call usage samples.
    pub fn with_usage_hook(mut self, hook: UsageHook) -> Self {
        self.usage_hook = Some(hook);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn resolve_model<'a>(&'a self, options: &'a ChatOptions) -> &'a str {
        if options.model.is_empty() {
            &self.default_model
        } else {
            &options.model
        }
    }

    fn build_body(&self, messages: &[ChatMessage], options: &ChatOptions, stream: bool) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": self.resolve_model(options),
            "messages": wire_messages,
        });

        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = options.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if !options.tools.is_empty() {
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }
        if let Some(schema) = &options.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {"name": "response", "strict": true, "schema": schema},
            });
        }
        if stream {
            body["stream"] = json!(true);
            // Ask for the usage frame on the final chunk.
            body["stream_options"] = json!({"include_usage": true});
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_http_error(status, &text))
    }

    fn report_usage(&self, scope: &str, usage: TokenUsage) {
        if let Some(hook) = &self.usage_hook {
            hook(UsageSample::new(scope, usage.input_tokens, usage.output_tokens));
        }
    }

    /// Dollar cost of one call at this client's pricing.
    pub fn cost_usd(&self, usage: TokenUsage) -> f64 {
        self.pricing.cost_usd(usage)
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        let body = self.build_body(messages, options, false);

        let response = with_retry(&self.retry, cancel, || async {
            tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.send(&body) => result,
            }
        })
        .await?;

        let wire: WireResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            parsed = response.json::<WireResponse>() => parsed.map_err(Error::from)?,
        };

        let parsed = parse_completion(wire)?;
        self.report_usage(&options.scope, parsed.usage);
        Ok(parsed)
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        cancel: &CancellationToken,
        on_chunk: ChunkHandler<'_>,
    ) -> Result<ChatResponse> {
        let body = self.build_body(messages, options, true);

        // Retry covers connection establishment only; an interrupted stream
        // surfaces as an error and the caller issues a fresh call.
        let mut response = with_retry(&self.retry, cancel, || async {
            tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.send(&body) => result,
            }
        })
        .await?;

        let mut merged = String::new();
        let mut pending = String::new();
        let mut usage = TokenUsage::default();
        let mut finish_reason = FinishReason::Stop;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk.map_err(Error::from)?,
            };
            let Some(bytes) = chunk else { break };
            pending.push_str(&String::from_utf8_lossy(&bytes));
            drain_sse_frames(&mut pending, &mut merged, &mut usage, &mut finish_reason, on_chunk);
        }
        drain_sse_frames(&mut pending, &mut merged, &mut usage, &mut finish_reason, on_chunk);

        on_chunk(StreamChunk {
            text: String::new(),
            done: true,
        });

        self.report_usage(&options.scope, usage);
        Ok(ChatResponse {
            message: ChatMessage::assistant(merged),
            finish_reason,
            usage,
            tool_calls: Vec::new(),
        })
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

fn classify_http_error(status: reqwest::StatusCode, body: &str) -> Error {
    match status.as_u16() {
        429 => Error::RateLimited {
            retry_after: parse_retry_after(body),
        },
        400 | 413 if body.contains("context") || body.contains("maximum context length") => {
            Error::ContextOverflow(truncate(body, 200))
        }
        500..=599 => Error::ProviderUnavailable(format!("{status}: {}", truncate(body, 200))),
        _ => Error::MalformedResponse(format!("{status}: {}", truncate(body, 200))),
    }
}

fn parse_retry_after(body: &str) -> Option<Duration> {
    // OpenRouter embeds `"retry_after": <seconds>` in 429 bodies.
    let value: Value = serde_json::from_str(body).ok()?;
    let seconds = value.get("error")?.get("retry_after")?.as_u64()?;
    Some(Duration::from_secs(seconds))
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_completion(wire: WireResponse) -> Result<ChatResponse> {
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::MalformedResponse("response carried no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| {
            let arguments = serde_json::from_str(&tc.function.arguments)
                .unwrap_or(Value::String(tc.function.arguments));
            ToolInvocation {
                name: tc.function.name,
                arguments,
            }
        })
        .collect();

    let usage = wire
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: ChatMessage::assistant(choice.message.content.unwrap_or_default()),
        finish_reason: choice
            .finish_reason
            .as_deref()
            .map(FinishReason::from_wire)
            .unwrap_or_default(),
        usage,
        tool_calls,
    })
}

fn drain_sse_frames(
    pending: &mut String,
    merged: &mut String,
    usage: &mut TokenUsage,
    finish_reason: &mut FinishReason,
    on_chunk: ChunkHandler<'_>,
) {
    loop {
        if let Some(pos) = pending.find("\n\n") {
            let frame = pending[..pos].to_string();
            pending.drain(..pos + 2);
            handle_sse_frame(&frame, merged, usage, finish_reason, on_chunk);
            continue;
        }
        if let Some(pos) = pending.find("\r\n\r\n") {
            let frame = pending[..pos].to_string();
            pending.drain(..pos + 4);
            handle_sse_frame(&frame, merged, usage, finish_reason, on_chunk);
            continue;
        }
        break;
    }
}

fn handle_sse_frame(
    frame: &str,
    merged: &mut String,
    usage: &mut TokenUsage,
    finish_reason: &mut FinishReason,
    on_chunk: ChunkHandler<'_>,
) {
    for raw_line in frame.lines() {
        let line = raw_line.trim_end_matches('\r');
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
            continue;
        };
        if let Some(u) = event.usage {
            usage.input_tokens = u.prompt_tokens;
            usage.output_tokens = u.completion_tokens;
        }
        let Some(choice) = event.choices.into_iter().next() else {
            continue;
        };
        if let Some(reason) = choice.finish_reason.as_deref() {
            *finish_reason = FinishReason::from_wire(reason);
        }
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            merged.push_str(&text);
            on_chunk(StreamChunk { text, done: false });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_classification() {
        assert!(matches!(
            classify_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "{}"),
            Error::RateLimited { .. }
        ));
        assert!(matches!(
            classify_http_error(
                reqwest::StatusCode::BAD_REQUEST,
                "this model's maximum context length is 128000"
            ),
            Error::ContextOverflow(_)
        ));
        assert!(matches!(
            classify_http_error(reqwest::StatusCode::BAD_GATEWAY, "upstream"),
            Error::ProviderUnavailable(_)
        ));
        assert!(matches!(
            classify_http_error(reqwest::StatusCode::UNAUTHORIZED, "bad key"),
            Error::MalformedResponse(_)
        ));
    }

    #[test]
    fn retry_after_parsed_from_error_body() {
        let body = r#"{"error": {"message": "slow down", "retry_after": 7}}"#;
        assert_eq!(parse_retry_after(body), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("not json"), None);
    }

    #[test]
    fn sse_frames_accumulate_content_and_usage() {
        let mut merged = String::new();
        let mut usage = TokenUsage::default();
        let mut finish = FinishReason::Stop;
        let mut chunks = Vec::new();
        let mut on_chunk = |c: StreamChunk| chunks.push(c);

        let mut pending = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":4}}\n\n",
            "data: [DONE]\n\n",
        )
        .to_string();

        drain_sse_frames(&mut pending, &mut merged, &mut usage, &mut finish, &mut on_chunk);

        assert_eq!(merged, "Paris");
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 4);
        assert_eq!(finish, FinishReason::Stop);
        assert_eq!(chunks.len(), 2);
        assert!(pending.is_empty());
    }

    #[test]
    fn partial_sse_frame_stays_pending() {
        let mut merged = String::new();
        let mut usage = TokenUsage::default();
        let mut finish = FinishReason::Stop;
        let mut on_chunk = |_c: StreamChunk| {};

        let mut pending = "data: {\"choices\":[{\"delta\":{\"content\":\"half".to_string();
        drain_sse_frames(&mut pending, &mut merged, &mut usage, &mut finish, &mut on_chunk);

        assert!(merged.is_empty());
        assert!(!pending.is_empty());
    }

    #[test]
    fn completion_parse_extracts_tool_calls() {
        let wire: WireResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{"function": {"name": "search", "arguments": "{\"query\": \"q\"}"}}]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 2}
            }"#,
        )
        .unwrap();

        let parsed = parse_completion(wire).unwrap();
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "search");
        assert_eq!(parsed.tool_calls[0].arguments["query"], "q");
    }

    #[test]
    fn pricing_converts_tokens_to_usd() {
        let pricing = Pricing {
            input_usd_per_mtok: 2.0,
            output_usd_per_mtok: 10.0,
        };
        let usage = TokenUsage {
            input_tokens: 500_000,
            output_tokens: 100_000,
        };
        assert!((pricing.cost_usd(usage) - 2.0).abs() < 1e-9);
    }
}
