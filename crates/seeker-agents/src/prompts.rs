//! Prompt builders for the agent family.
//!
//! All prompts ask for constrained JSON; the shapes here must stay in sync
//! with the serde types in the agent modules.

use seeker_types::{Contradiction, Fact, ValidatedFact};
use seeker_tools::ToolDescriptor;

pub fn perspective_discovery(topic: &str, survey: &str, hints: Option<&str>) -> String {
    let hint_block = match hints {
        Some(h) => format!("\nUser hints: {h}\n"),
        None => String::new(),
    };
    format!(
        "You are planning a research project on: {topic}\n{hint_block}\n\
         Preliminary search results:\n{survey}\n\n\
         Identify 3 to 6 distinct expert perspectives that together would cover this topic \
         thoroughly. Each perspective needs a short name, a one-sentence focus, and 3 to 5 \
         seed questions.\n\n\
         Respond with JSON only:\n\
         {{\"perspectives\": [{{\"name\": \"...\", \"focus\": \"...\", \"questions\": [\"...\"]}}]}}"
    )
}

pub fn think(
    focus: &str,
    questions: &[String],
    facts: &[Fact],
    observations: &str,
    tools: &[ToolDescriptor],
) -> String {
    let tool_lines: Vec<String> = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect();
    let fact_lines: Vec<String> = facts
        .iter()
        .map(|f| format!("- {} ({})", f.content, f.source_url))
        .collect();
    format!(
        "You are researching from this perspective: {focus}\n\n\
         Open questions:\n{}\n\n\
         Facts confirmed so far:\n{}\n\n\
         Latest observations:\n{}\n\n\
         Available tools:\n{}\n\n\
         Decide the next step. Either gather more evidence or, if the questions are \
         sufficiently answered, finalize with a concise answer.\n\n\
         Respond with JSON only, one of:\n\
         {{\"reasoning\": \"...\", \"action\": {{\"type\": \"search\", \"queries\": [\"...\"]}}}}\n\
         {{\"reasoning\": \"...\", \"action\": {{\"type\": \"call_tool\", \"tool\": \"fetch\", \"args\": {{\"url\": \"...\"}}}}}}\n\
         {{\"reasoning\": \"...\", \"action\": {{\"type\": \"finalize\", \"answer\": \"...\"}}}}",
        bullet(questions),
        join_or_none(&fact_lines),
        if observations.is_empty() { "(none yet)" } else { observations },
        tool_lines.join("\n"),
    )
}

pub fn extract_facts(focus: &str, observations: &str) -> String {
    format!(
        "From the research notes below, extract verifiable facts relevant to: {focus}\n\n\
         Notes:\n{observations}\n\n\
         Each fact needs the exact source URL it came from and a confidence in [0,1]. \
         Skip opinions and marketing claims.\n\n\
         Respond with JSON only:\n\
         {{\"facts\": [{{\"content\": \"...\", \"source_url\": \"https://...\", \"confidence\": 0.0}}]}}"
    )
}

pub fn identify_gaps(focus: &str, questions: &[String], facts: &[Fact]) -> String {
    let fact_lines: Vec<String> = facts.iter().map(|f| format!("- {}", f.content)).collect();
    format!(
        "Perspective: {focus}\n\nOriginal questions:\n{}\n\nConfirmed facts:\n{}\n\n\
         Which important questions remain unanswered? List them as short, searchable \
         questions. Return an empty list if coverage is good.\n\n\
         Respond with JSON only:\n{{\"gaps\": [\"...\"]}}",
        bullet(questions),
        join_or_none(&fact_lines),
    )
}

pub fn cross_validate(facts: &[Fact]) -> String {
    let fact_lines: Vec<String> = facts
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{i}. {} [{}]", f.content, f.source_url))
        .collect();
    format!(
        "Cross-validate these facts by source diversity. A fact is `supported` when \
         multiple independent sources in the list corroborate it, `weak` when it rests on \
         one source, `unsupported` when the list contradicts or cannot back it.\n\n\
         Facts:\n{}\n\n\
         Respond with JSON only:\n\
         {{\"validations\": [{{\"index\": 0, \"status\": \"supported\"}}]}}",
        fact_lines.join("\n"),
    )
}

pub fn find_contradictions(facts: &[Fact]) -> String {
    let fact_lines: Vec<String> = facts
        .iter()
        .map(|f| format!("- {} [{}]", f.content, f.source_url))
        .collect();
    format!(
        "Find pairs of facts below whose claims conflict. Tag each pair's nature: \
         `direct` (cannot both be true), `nuanced` (disagree in degree), or `scope` \
         (true in different scopes).\n\n\
         Facts:\n{}\n\n\
         Respond with JSON only:\n\
         {{\"contradictions\": [{{\"claim_a\": \"...\", \"source_a\": \"...\", \
         \"claim_b\": \"...\", \"source_b\": \"...\", \"nature\": \"direct\"}}]}}",
        fact_lines.join("\n"),
    )
}

pub fn rank_gaps(topic: &str, facts: &[Fact], search_gaps: &[String]) -> String {
    let fact_lines: Vec<String> = facts.iter().map(|f| format!("- {}", f.content)).collect();
    format!(
        "Topic: {topic}\n\nConfirmed facts:\n{}\n\n\
         Gap candidates raised during search:\n{}\n\n\
         Rank the knowledge gaps that matter most for a complete report. Score importance \
         in [0,1] and suggest concrete search queries for each.\n\n\
         Respond with JSON only:\n\
         {{\"gaps\": [{{\"description\": \"...\", \"importance\": 0.0, \
         \"suggested_queries\": [\"...\"]}}]}}",
        join_or_none(&fact_lines),
        bullet(search_gaps),
    )
}

pub fn outline(topic: &str, validated: &[ValidatedFact], contradictions: &[Contradiction]) -> String {
    let fact_lines: Vec<String> = validated
        .iter()
        .map(|v| format!("- [{:?}] {}", v.status, v.fact.content))
        .collect();
    let contradiction_lines: Vec<String> = contradictions
        .iter()
        .map(|c| format!("- \"{}\" vs \"{}\"", c.claim_a, c.claim_b))
        .collect();
    format!(
        "Design a research report on: {topic}\n\n\
         Validated facts:\n{}\n\n\
         Known contradictions (address them honestly):\n{}\n\n\
         Produce a title, an abstract of at most 500 characters, and 4 to 7 top-level \
         sections with the key points each should make.\n\n\
         Respond with JSON only:\n\
         {{\"title\": \"...\", \"summary\": \"...\", \
         \"sections\": [{{\"heading\": \"...\", \"key_points\": [\"...\"]}}]}}",
        join_or_none(&fact_lines),
        join_or_none(&contradiction_lines),
    )
}

pub fn write_section(
    topic: &str,
    heading: &str,
    key_points: &[String],
    numbered_sources: &str,
    facts: &[Fact],
    strict: bool,
) -> String {
    let fact_lines: Vec<String> = facts
        .iter()
        .map(|f| format!("- {} [{}]", f.content, f.source_url))
        .collect();
    let strictness = if strict {
        "\nIMPORTANT: Write ONLY the section body in markdown prose. Every factual claim \
         must carry a [n] marker from the source list. Do not invent sources."
    } else {
        ""
    };
    format!(
        "You are writing one section of a research report on: {topic}\n\n\
         Section: {heading}\nKey points to cover:\n{}\n\n\
         Facts available:\n{}\n\n\
         Numbered sources (cite as [n]):\n{numbered_sources}\n\n\
         Write the section body in markdown. Use [n] reference markers for claims.{strictness}",
        bullet(key_points),
        join_or_none(&fact_lines),
    )
}

pub fn folding_decision(usage: usize, budget: usize, working: usize, levels: &str) -> String {
    format!(
        "You manage the context memory of a research agent.\n\
         Current usage: {usage} tokens of a {budget} token budget.\n\
         Working memory holds {working} turns. Summary levels: {levels}\n\n\
         Choose a folding action:\n\
         - none: keep everything as is\n\
         - granular_condensation: compress the oldest working-memory turn\n\
         - deep_consolidation: fold summary levels 0..=level into one coarser summary\n\n\
         Respond with JSON only, one of:\n\
         {{\"action\": \"none\"}}\n\
         {{\"action\": \"granular_condensation\"}}\n\
         {{\"action\": \"deep_consolidation\", \"level\": 0}}"
    )
}

fn bullet(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn join_or_none(lines: &[String]) -> String {
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}
