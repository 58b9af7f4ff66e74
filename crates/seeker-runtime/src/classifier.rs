use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use seeker_agents::parse_structured;
use seeker_llm::{ChatClient, ChatMessage, ChatOptions};

/// What kind of input the user just typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// A fresh research topic.
    Research,
    /// A question answerable from the existing report.
    Question,
    /// A request to extend the current research.
    Expand,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: QueryType,
    pub confidence: f64,
    pub topic: String,
}

#[derive(Debug, Deserialize)]
struct ClassificationWire {
    #[serde(rename = "type")]
    kind: QueryType,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    topic: String,
}

/// Optional input classifier for the interactive loop.
///
/// Classification failures never block the user: the caller falls back to
/// treating the input as a new research query.
pub struct QueryClassifier {
    client: Arc<dyn ChatClient>,
    model: Option<String>,
}

impl QueryClassifier {
    pub fn new(client: Arc<dyn ChatClient>, model: Option<String>) -> Self {
        Self { client, model }
    }

    pub async fn classify(
        &self,
        query: &str,
        has_session: bool,
        session_summary: &str,
        cancel: &CancellationToken,
    ) -> Classification {
        let fallback = Classification {
            kind: QueryType::Research,
            confidence: 0.0,
            topic: query.to_string(),
        };

        let bias = if has_session && !session_summary.is_empty() {
            format!(
                "\nAn active session exists with this report summary:\n{session_summary}\n\
                 Prefer `question` unless the input clearly starts a new topic."
            )
        } else {
            String::new()
        };
        let prompt = format!(
            "Classify this user input for a research assistant.{bias}\n\n\
             Input: {query}\n\n\
             Respond with JSON only:\n\
             {{\"type\": \"research\"|\"question\"|\"expand\", \"confidence\": 0.0, \"topic\": \"...\"}}"
        );

        let mut options = ChatOptions::scoped("classifier");
        if let Some(model) = &self.model {
            options = options.with_model(model.clone());
        }

        let response = match self
            .client
            .chat(&[ChatMessage::user(prompt)], &options, cancel)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "classification failed, defaulting to research");
                return fallback;
            }
        };

        match parse_structured::<ClassificationWire>(&response.message.content) {
            Ok(wire) => Classification {
                kind: wire.kind,
                confidence: wire.confidence.clamp(0.0, 1.0),
                topic: if wire.topic.trim().is_empty() {
                    query.to_string()
                } else {
                    wire.topic
                },
            },
            Err(err) => {
                tracing::debug!(error = %err, "classification unparseable, defaulting to research");
                fallback
            }
        }
    }
}
