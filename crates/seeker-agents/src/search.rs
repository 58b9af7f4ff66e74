use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use seeker_llm::{ChatClient, ChatMessage, ChatOptions, StreamChunk};
use seeker_tools::ToolRegistry;
use seeker_types::{
    EventSink, Fact, Perspective, ProgressPayload, ResearchEvent, SearchOutcome, SessionId,
};

use crate::{Result, ask_structured, parse_structured, prompts};

/// Knobs of the Think-Act-Observe loop.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Iteration budget for the whole perspective, re-entries included.
    pub max_iterations: u32,
    /// Concurrent web searches within one iteration.
    pub fan_out: usize,
    /// Characters kept per observation.
    pub observation_limit: usize,
    /// Sufficiency: at least this many facts…
    pub min_facts: usize,
    /// …and fewer than this many open gaps.
    pub gap_threshold: usize,
    /// Facts below this confidence are discarded.
    pub confidence_floor: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            fan_out: 5,
            observation_limit: 4000,
            min_facts: 5,
            gap_threshold: 2,
            confidence_floor: 0.3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThinkResponse {
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
    action: ThinkAction,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ThinkAction {
    /// Concurrent web searches.
    Search { queries: Vec<String> },
    /// Any registered tool, verbatim model-produced args.
    CallTool { tool: String, args: Value },
    Finalize { answer: String },
}

#[derive(Debug, Deserialize)]
struct FactsResponse {
    #[serde(default)]
    facts: Vec<FactSpec>,
}

#[derive(Debug, Deserialize)]
struct FactSpec {
    content: String,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct GapsResponse {
    #[serde(default)]
    gaps: Vec<String>,
}

#[derive(Default)]
struct SearchState {
    questions: Vec<String>,
    facts: Vec<Fact>,
    sources: Vec<String>,
    gaps: Vec<String>,
    observations: String,
    answer: Option<String>,
    iteration: u32,
}

impl SearchState {
    fn record_source(&mut self, url: &str) {
        if !url.is_empty() && !self.sources.iter().any(|s| s == url) {
            self.sources.push(url.to_string());
        }
    }

    fn into_outcome(self, perspective: &Perspective) -> SearchOutcome {
        SearchOutcome {
            perspective: perspective.name.clone(),
            answer: self.answer.unwrap_or_default(),
            facts: self.facts,
            sources: self.sources,
            gaps: self.gaps,
        }
    }
}

/// Iterative Think-Act-Observe search for one perspective.
pub struct SearchAgent {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    sink: Arc<dyn EventSink>,
    session_id: SessionId,
    config: SearchConfig,
}

impl SearchAgent {
    pub fn new(
        client: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        sink: Arc<dyn EventSink>,
        session_id: SessionId,
    ) -> Self {
        Self {
            client,
            registry,
            sink,
            session_id,
            config: SearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the loop for `perspective`, attributed to worker `worker`.
    ///
    /// Cancellation flushes whatever facts were confirmed before the
    /// cancellation point instead of erroring.
    pub async fn run(
        &self,
        worker: u32,
        perspective: &Perspective,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        let mut state = SearchState {
            questions: perspective.questions.clone(),
            ..SearchState::default()
        };

        match self.drive(worker, perspective, &mut state, cancel).await {
            Ok(()) => Ok(state.into_outcome(perspective)),
            Err(err) if err.is_cancelled() => {
                tracing::debug!(worker, "search cancelled, flushing partial outcome");
                Ok(state.into_outcome(perspective))
            }
            Err(err) => Err(err),
        }
    }

    async fn drive(
        &self,
        worker: u32,
        perspective: &Perspective,
        state: &mut SearchState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            // Think-Act-Observe until finalize or budget.
            while state.iteration < self.config.max_iterations {
                state.iteration += 1;
                self.emit(ProgressPayload::IterationStarted {
                    worker,
                    iteration: state.iteration,
                });

                let think = self.think(worker, perspective, state, cancel).await?;
                match think.action {
                    ThinkAction::Finalize { answer } => {
                        state.answer = Some(answer);
                        break;
                    }
                    action => self.act(worker, action, state, cancel).await,
                }
            }

            self.extract_facts(worker, perspective, state, cancel).await?;
            self.identify_gaps(worker, perspective, state, cancel).await?;

            let sufficient = state.facts.len() >= self.config.min_facts
                && state.gaps.len() < self.config.gap_threshold;
            if sufficient
                || state.gaps.is_empty()
                || state.iteration >= self.config.max_iterations
            {
                return Ok(());
            }

            // Follow-up round: the open gaps become the next questions.
            state.questions = state.gaps.clone();
            self.emit(ProgressPayload::WorkerProgress {
                worker,
                message: format!("following up on {} gaps", state.questions.len()),
            });
        }
    }

    /// One streamed reasoning step.
    async fn think(
        &self,
        worker: u32,
        perspective: &Perspective,
        state: &SearchState,
        cancel: &CancellationToken,
    ) -> Result<ThinkResponse> {
        let scope = format!("search/{worker}/iter-{}", state.iteration);
        let prompt = prompts::think(
            &perspective.focus,
            &state.questions,
            &state.facts,
            &state.observations,
            &self.registry.descriptors(),
        );
        let messages = [ChatMessage::user(prompt)];
        let options = ChatOptions::scoped(&scope).with_temperature(0.3);

        let sink = self.sink.clone();
        let session_id = self.session_id;
        let scope_for_chunks = scope.clone();
        let mut on_chunk = move |chunk: StreamChunk| {
            sink.emit(ResearchEvent::new(
                session_id,
                ProgressPayload::LlmChunk {
                    worker: Some(worker),
                    scope: scope_for_chunks.clone(),
                    text: chunk.text,
                    done: chunk.done,
                },
            ));
        };

        let response = self
            .client
            .stream_chat(&messages, &options, cancel, &mut on_chunk)
            .await?;

        match parse_structured::<ThinkResponse>(&response.message.content) {
            Ok(parsed) => Ok(parsed),
            Err(_) => {
                // One repair retry, unstreamed: the think schema is cheap.
                let mut repair = messages.to_vec();
                repair.push(response.message);
                repair.push(ChatMessage::user(
                    "Return ONLY JSON: {\"reasoning\": \"...\", \"action\": {\"type\": \
                     \"search\"|\"call_tool\"|\"finalize\", ...}}",
                ));
                let retried = self.client.chat(&repair, &options, cancel).await?;
                parse_structured(&retried.message.content)
            }
        }
    }

    /// Execute the chosen action and append the observation.
    async fn act(
        &self,
        worker: u32,
        action: ThinkAction,
        state: &mut SearchState,
        cancel: &CancellationToken,
    ) {
        let observation = match action {
            ThinkAction::Search { queries } => {
                let calls = queries
                    .iter()
                    .take(self.config.fan_out)
                    .map(|q| {
                        self.registry
                            .invoke("search", json!({"query": q}), Some(worker), cancel)
                    })
                    .collect::<Vec<_>>();

                let mut lines = Vec::new();
                for (query, result) in queries.iter().zip(join_all(calls).await) {
                    match result {
                        Ok(value) => {
                            let hits: Vec<seeker_tools::SearchResult> =
                                serde_json::from_value(value).unwrap_or_default();
                            for hit in &hits {
                                state.record_source(&hit.url);
                            }
                            lines.push(format_hits(query, &hits));
                        }
                        Err(err) => lines.push(format!("search `{query}` failed: {err}")),
                    }
                }
                lines.join("\n")
            }
            ThinkAction::CallTool { tool, args } => {
                if let Some(url) = args.get("url").and_then(Value::as_str) {
                    state.record_source(url);
                }
                match self.registry.invoke(&tool, args, Some(worker), cancel).await {
                    Ok(value) => render_tool_output(&value),
                    Err(err) => format!("tool `{tool}` failed: {err}"),
                }
            }
            ThinkAction::Finalize { .. } => unreachable!("finalize handled by caller"),
        };

        let trimmed = truncate_chars(&observation, self.config.observation_limit);
        if !state.observations.is_empty() {
            state.observations.push('\n');
        }
        state.observations.push_str(&trimmed);
        // Older observations age out; facts carry the durable knowledge.
        if state.observations.len() > self.config.observation_limit * 2 {
            let keep_from = state.observations.len() - self.config.observation_limit;
            state.observations = state.observations.split_off(keep_from);
        }
    }

    async fn extract_facts(
        &self,
        worker: u32,
        perspective: &Perspective,
        state: &mut SearchState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if state.observations.is_empty() && state.answer.is_none() {
            return Ok(());
        }
        let notes = match &state.answer {
            Some(answer) => format!("{}\nFinal answer: {answer}", state.observations),
            None => state.observations.clone(),
        };
        let prompt = prompts::extract_facts(&perspective.focus, &notes);
        let options = ChatOptions::scoped(format!("search/{worker}/facts"));

        let response: FactsResponse = ask_structured(
            self.client.as_ref(),
            &[ChatMessage::user(prompt)],
            &options,
            r#"{"facts": [{"content": "...", "source_url": "https://...", "confidence": 0.0}]}"#,
            cancel,
        )
        .await?;

        for spec in response.facts {
            if spec.confidence < self.config.confidence_floor || spec.content.trim().is_empty() {
                continue;
            }
            let fact = Fact::new(spec.content, spec.source_url, spec.confidence);
            state.record_source(&fact.source_url);
            if !state.facts.iter().any(|f| f.content == fact.content) {
                state.facts.push(fact);
            }
        }
        Ok(())
    }

    async fn identify_gaps(
        &self,
        worker: u32,
        perspective: &Perspective,
        state: &mut SearchState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let prompt = prompts::identify_gaps(&perspective.focus, &state.questions, &state.facts);
        let options = ChatOptions::scoped(format!("search/{worker}/gaps"));

        let response: GapsResponse = ask_structured(
            self.client.as_ref(),
            &[ChatMessage::user(prompt)],
            &options,
            r#"{"gaps": ["..."]}"#,
            cancel,
        )
        .await?;

        state.gaps = response
            .gaps
            .into_iter()
            .filter(|g| !g.trim().is_empty())
            .collect();
        Ok(())
    }

    fn emit(&self, payload: ProgressPayload) {
        self.sink.emit(ResearchEvent::new(self.session_id, payload));
    }
}

fn format_hits(query: &str, hits: &[seeker_tools::SearchResult]) -> String {
    if hits.is_empty() {
        return format!("search `{query}`: no results");
    }
    let lines: Vec<String> = hits
        .iter()
        .map(|h| format!("- {} [{}]: {}", h.title, h.url, h.snippet))
        .collect();
    format!("search `{query}`:\n{}", lines.join("\n"))
}

fn render_tool_output(value: &Value) -> String {
    match value.get("text").and_then(Value::as_str) {
        Some(text) => text.to_string(),
        None => value.to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
