use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use seeker_llm::{ChatClient, ChatMessage, ChatOptions};
use seeker_types::{
    AnalysisResult, Contradiction, EventSink, Fact, KnowledgeGap, ProgressPayload, ResearchEvent,
    SessionId, SourceQuality, ValidatedFact, ValidationStatus,
};

use crate::{Result, ask_structured, prompts};
use seeker_tools::host_of;

#[derive(Debug, Deserialize)]
struct ValidationsResponse {
    #[serde(default)]
    validations: Vec<ValidationSpec>,
}

#[derive(Debug, Deserialize)]
struct ValidationSpec {
    index: usize,
    status: ValidationStatus,
}

#[derive(Debug, Deserialize)]
struct ContradictionsResponse {
    #[serde(default)]
    contradictions: Vec<Contradiction>,
}

#[derive(Debug, Deserialize)]
struct GapRankingResponse {
    #[serde(default)]
    gaps: Vec<GapSpec>,
}

#[derive(Debug, Deserialize)]
struct GapSpec {
    description: String,
    #[serde(default)]
    importance: f64,
    #[serde(default)]
    suggested_queries: Vec<String>,
}

/// Cross-validation, contradiction detection and gap ranking over the
/// union of all search facts.
pub struct AnalysisAgent {
    client: Arc<dyn ChatClient>,
    sink: Arc<dyn EventSink>,
    session_id: SessionId,
}

impl AnalysisAgent {
    pub fn new(
        client: Arc<dyn ChatClient>,
        sink: Arc<dyn EventSink>,
        session_id: SessionId,
    ) -> Self {
        Self {
            client,
            sink,
            session_id,
        }
    }

    pub async fn run(
        &self,
        topic: &str,
        facts: &[Fact],
        search_gaps: &[String],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        self.emit(ProgressPayload::AnalysisStarted {});

        let validated_facts = self.cross_validate(facts, cancel).await?;

        self.emit(ProgressPayload::AnalysisProgress {
            stage: "contradictions".to_string(),
        });
        let contradictions = self.find_contradictions(facts, cancel).await?;

        self.emit(ProgressPayload::AnalysisProgress {
            stage: "gap ranking".to_string(),
        });
        let gaps = self.rank_gaps(topic, facts, search_gaps, cancel).await?;

        // Source-quality scoring is a local heuristic, no LLM involved.
        let source_quality = score_sources(facts);

        self.emit(ProgressPayload::AnalysisComplete {
            validated: validated_facts.len(),
            contradictions: contradictions.len(),
            gaps: gaps.len(),
        });

        Ok(AnalysisResult {
            validated_facts,
            contradictions,
            gaps,
            source_quality,
        })
    }

    async fn cross_validate(
        &self,
        facts: &[Fact],
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidatedFact>> {
        self.emit(ProgressPayload::CrossValidationStarted {
            fact_count: facts.len(),
        });
        if facts.is_empty() {
            self.emit(ProgressPayload::CrossValidationComplete {
                supported: 0,
                weak: 0,
                unsupported: 0,
            });
            return Ok(Vec::new());
        }

        let prompt = prompts::cross_validate(facts);
        let options = ChatOptions::scoped("analysis/cross-validate");
        let response: ValidationsResponse = ask_structured(
            self.client.as_ref(),
            &[ChatMessage::user(prompt)],
            &options,
            r#"{"validations": [{"index": 0, "status": "supported"}]}"#,
            cancel,
        )
        .await?;

        // Unmentioned facts default to weak rather than vanishing.
        let mut statuses = vec![ValidationStatus::Weak; facts.len()];
        for spec in response.validations {
            if let Some(slot) = statuses.get_mut(spec.index) {
                *slot = spec.status;
            }
        }

        let validated: Vec<ValidatedFact> = facts
            .iter()
            .zip(statuses)
            .map(|(fact, status)| ValidatedFact {
                fact: fact.clone(),
                status,
            })
            .collect();

        let count = |s: ValidationStatus| validated.iter().filter(|v| v.status == s).count();
        self.emit(ProgressPayload::CrossValidationComplete {
            supported: count(ValidationStatus::Supported),
            weak: count(ValidationStatus::Weak),
            unsupported: count(ValidationStatus::Unsupported),
        });
        Ok(validated)
    }

    async fn find_contradictions(
        &self,
        facts: &[Fact],
        cancel: &CancellationToken,
    ) -> Result<Vec<Contradiction>> {
        if facts.len() < 2 {
            return Ok(Vec::new());
        }
        let prompt = prompts::find_contradictions(facts);
        let options = ChatOptions::scoped("analysis/contradictions");
        let response: ContradictionsResponse = ask_structured(
            self.client.as_ref(),
            &[ChatMessage::user(prompt)],
            &options,
            r#"{"contradictions": [{"claim_a": "...", "source_a": "...", "claim_b": "...", "source_b": "...", "nature": "direct"}]}"#,
            cancel,
        )
        .await?;
        Ok(response.contradictions)
    }

    async fn rank_gaps(
        &self,
        topic: &str,
        facts: &[Fact],
        search_gaps: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<KnowledgeGap>> {
        let prompt = prompts::rank_gaps(topic, facts, search_gaps);
        let options = ChatOptions::scoped("analysis/gaps");
        let response: GapRankingResponse = ask_structured(
            self.client.as_ref(),
            &[ChatMessage::user(prompt)],
            &options,
            r#"{"gaps": [{"description": "...", "importance": 0.0, "suggested_queries": ["..."]}]}"#,
            cancel,
        )
        .await?;

        let mut gaps: Vec<KnowledgeGap> = response
            .gaps
            .into_iter()
            .filter(|g| !g.description.trim().is_empty())
            .map(|g| KnowledgeGap {
                description: g.description,
                importance: g.importance.clamp(0.0, 1.0),
                suggested_queries: g.suggested_queries,
            })
            .collect();
        gaps.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(gaps)
    }

    fn emit(&self, payload: ProgressPayload) {
        self.sink.emit(ResearchEvent::new(self.session_id, payload));
    }
}

/// Fixed heuristic over the source pool: host diversity dominates, with a
/// small bonus for https.
pub fn score_sources(facts: &[Fact]) -> SourceQuality {
    let urls: HashSet<&str> = facts
        .iter()
        .map(|f| f.source_url.as_str())
        .filter(|u| !u.is_empty())
        .collect();
    let hosts: HashSet<String> = urls.iter().filter_map(|u| host_of(u)).collect();

    let source_count = urls.len();
    if source_count == 0 {
        return SourceQuality::default();
    }

    let diversity = hosts.len() as f64 / source_count as f64;
    let https_share = urls.iter().filter(|u| u.starts_with("https://")).count() as f64
        / source_count as f64;
    let score = (0.7 * diversity + 0.3 * https_share).clamp(0.0, 1.0);

    SourceQuality {
        distinct_hosts: hosts.len(),
        source_count,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(content: &str, url: &str) -> Fact {
        Fact::new(content, url, 0.9)
    }

    #[test]
    fn empty_pool_scores_zero() {
        let quality = score_sources(&[]);
        assert_eq!(quality.source_count, 0);
        assert_eq!(quality.score, 0.0);
    }

    #[test]
    fn diverse_hosts_score_higher() {
        let diverse = score_sources(&[
            fact("a", "https://one.com/x"),
            fact("b", "https://two.com/y"),
            fact("c", "https://three.com/z"),
        ]);
        let monoculture = score_sources(&[
            fact("a", "https://one.com/x"),
            fact("b", "https://one.com/y"),
            fact("c", "https://one.com/z"),
        ]);
        assert!(diverse.score > monoculture.score);
        assert_eq!(diverse.distinct_hosts, 3);
        assert_eq!(monoculture.distinct_hosts, 1);
    }

    #[test]
    fn validation_status_deserializes() {
        let spec: ValidationSpec =
            serde_json::from_str(r#"{"index": 2, "status": "unsupported"}"#).unwrap();
        assert_eq!(spec.status, ValidationStatus::Unsupported);
    }
}
