use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use seeker_llm::{
    ChatClient, ChatMessage, ChatOptions, ChatResponse, ChunkHandler, Error, FinishReason, Result,
    StreamChunk, TokenUsage,
};

/// One scripted turn of the fake model.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Respond with this text.
    Text(String),
    /// Fail with a rate limit (retryable).
    RateLimited,
    /// Fail with a malformed-response error (fatal).
    Malformed,
    /// Block until cancelled, then fail with `Cancelled`.
    HangUntilCancelled,
}

/// Chat client that replays a queue of canned responses.
///
/// Every call consumes one entry; an exhausted script fails loudly so a
/// test that makes more calls than it scripted cannot pass by accident.
pub struct ScriptedChatClient {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    usage_per_call: TokenUsage,
}

impl Default for ScriptedChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            usage_per_call: TokenUsage {
                input_tokens: 100,
                output_tokens: 25,
            },
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_call = usage;
        self
    }

    pub fn push(&self, entry: Scripted) -> &Self {
        self.script.lock().unwrap().push_back(entry);
        self
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push(Scripted::Text(text.into()))
    }

    /// Messages of every call made so far, in order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    async fn next(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let entry = self.script.lock().unwrap().pop_front();
        match entry {
            Some(Scripted::Text(text)) => Ok(ChatResponse {
                message: ChatMessage::assistant(text),
                finish_reason: FinishReason::Stop,
                usage: self.usage_per_call,
                tool_calls: Vec::new(),
            }),
            Some(Scripted::RateLimited) => Err(Error::RateLimited { retry_after: None }),
            Some(Scripted::Malformed) => Err(Error::MalformedResponse("scripted".to_string())),
            Some(Scripted::HangUntilCancelled) => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
            None => Err(Error::ProviderUnavailable(
                "script exhausted: unexpected LLM call".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.next(messages, cancel).await
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        cancel: &CancellationToken,
        on_chunk: ChunkHandler<'_>,
    ) -> Result<ChatResponse> {
        let response = self.chat(messages, options, cancel).await?;
        // Stream in two chunks so subscribers see real deltas.
        let text = &response.message.content;
        let mid = text.len() / 2;
        let mid = (0..=mid).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        if mid > 0 {
            on_chunk(StreamChunk {
                text: text[..mid].to_string(),
                done: false,
            });
        }
        on_chunk(StreamChunk {
            text: text[mid..].to_string(),
            done: false,
        });
        on_chunk(StreamChunk {
            text: String::new(),
            done: true,
        });
        Ok(response)
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}
