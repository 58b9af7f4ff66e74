use serde::{Deserialize, Serialize};

// NOTE: Confidence and importance scores
//
// Every score in this module lives in [0, 1]. LLM responses are the only
// producers of these values and regularly emit out-of-range numbers, so the
// constructors clamp instead of rejecting. Ordering-sensitive consumers
// (gap ranking, fact filtering) rely on the clamp having already happened.

/// Named expert viewpoint driving one parallel search branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perspective {
    pub name: String,
    /// One-sentence description of what this viewpoint cares about.
    pub focus: String,
    /// Seed questions, in the order they should be pursued.
    pub questions: Vec<String>,
}

impl Perspective {
    /// The always-present fallback perspective guaranteeing broad coverage.
    pub const BASIC_FACTS_NAME: &'static str = "Basic fact writer";

    pub fn basic_facts(topic: &str) -> Self {
        Self {
            name: Self::BASIC_FACTS_NAME.to_string(),
            focus: format!("Fundamental facts, definitions and background about {topic}"),
            questions: vec![
                format!("What is {topic}?"),
                format!("What are the key facts about {topic}?"),
                format!("What recent developments relate to {topic}?"),
            ],
        }
    }
}

/// A single verifiable statement extracted from a source.
///
/// Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub content: String,
    pub source_url: String,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
}

impl Fact {
    pub fn new(content: impl Into<String>, source_url: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            source_url: source_url.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// How two conflicting claims disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionNature {
    /// The claims cannot both be true.
    Direct,
    /// The claims disagree in emphasis or degree.
    Nuanced,
    /// The claims hold in different scopes (time, region, population).
    Scope,
}

/// A pair of facts whose claims conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub claim_a: String,
    pub source_a: String,
    pub claim_b: String,
    pub source_b: String,
    pub nature: ContradictionNature,
}

/// A question the accumulated facts leave unanswered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub description: String,
    /// Importance in [0, 1]; gaps at or above 0.5 qualify for gap-filling.
    pub importance: f64,
    #[serde(default)]
    pub suggested_queries: Vec<String>,
}

impl KnowledgeGap {
    pub fn new(description: impl Into<String>, importance: f64) -> Self {
        Self {
            description: description.into(),
            importance: importance.clamp(0.0, 1.0),
            suggested_queries: Vec::new(),
        }
    }
}

/// Validation status assigned to a fact by cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Multiple independent sources agree.
    Supported,
    /// Only weakly corroborated.
    Weak,
    /// No corroboration found.
    Unsupported,
}

/// A fact together with its cross-validation verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedFact {
    pub fact: Fact,
    pub status: ValidationStatus,
}

/// Heuristic quality score for the accumulated source pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SourceQuality {
    /// Number of distinct hosts across all sources.
    pub distinct_hosts: usize,
    /// Total number of sources scored.
    pub source_count: usize,
    /// Aggregate score in [0, 1].
    pub score: f64,
}

/// Output of the analysis agent over the union of all search facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub validated_facts: Vec<ValidatedFact>,
    pub contradictions: Vec<Contradiction>,
    /// Gaps sorted descending by importance.
    pub gaps: Vec<KnowledgeGap>,
    pub source_quality: SourceQuality,
}

/// Everything one search branch produced for its perspective.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchOutcome {
    pub perspective: String,
    /// Final textual answer from the ReAct loop.
    pub answer: String,
    pub facts: Vec<Fact>,
    pub sources: Vec<String>,
    /// Unanswered questions surfaced during the loop.
    pub gaps: Vec<String>,
}

/// Aggregated product of the gap-filling sub-phase.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GapFillOutcome {
    /// Number of gaps that were actually pursued.
    pub gaps_filled: usize,
    pub new_facts: Vec<Fact>,
    pub sources: Vec<String>,
}

/// One numbered source in a report's reference list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Stable 1-based reference number, assigned in first-appearance order.
    pub id: usize,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The final research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    /// Abstract of at most 500 characters.
    pub summary: String,
    /// Full markdown body with `[n]` reference markers.
    pub full_content: String,
    pub citations: Vec<Citation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_confidence_is_clamped() {
        assert_eq!(Fact::new("a", "https://x", 1.7).confidence, 1.0);
        assert_eq!(Fact::new("a", "https://x", -0.2).confidence, 0.0);
        assert_eq!(Fact::new("a", "https://x", 0.42).confidence, 0.42);
    }

    #[test]
    fn gap_importance_is_clamped() {
        assert_eq!(KnowledgeGap::new("g", 2.0).importance, 1.0);
    }

    #[test]
    fn basic_facts_perspective_mentions_topic() {
        let p = Perspective::basic_facts("rust async");
        assert_eq!(p.name, Perspective::BASIC_FACTS_NAME);
        assert!(p.focus.contains("rust async"));
        assert_eq!(p.questions.len(), 3);
    }
}
