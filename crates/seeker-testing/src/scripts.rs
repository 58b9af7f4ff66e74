//! Canned LLM response bodies matching the agents' structured schemas.

use serde_json::json;

/// Perspectives-discovery response with the given names.
pub fn perspectives_json(names: &[&str]) -> String {
    let perspectives: Vec<_> = names
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "focus": format!("{name} focus"),
                "questions": [
                    format!("What about {name} one?"),
                    format!("What about {name} two?"),
                    format!("What about {name} three?"),
                ]
            })
        })
        .collect();
    json!({"perspectives": perspectives}).to_string()
}

/// Think step choosing concurrent web searches.
pub fn think_search_json(queries: &[&str]) -> String {
    json!({
        "reasoning": "need evidence",
        "action": {"type": "search", "queries": queries}
    })
    .to_string()
}

/// Think step finalizing with an answer.
pub fn think_finalize_json(answer: &str) -> String {
    json!({
        "reasoning": "questions answered",
        "action": {"type": "finalize", "answer": answer}
    })
    .to_string()
}

/// Fact-extraction response; `facts` is `(content, url, confidence)`.
pub fn facts_json(facts: &[(&str, &str, f64)]) -> String {
    let items: Vec<_> = facts
        .iter()
        .map(|(content, url, confidence)| {
            json!({"content": content, "source_url": url, "confidence": confidence})
        })
        .collect();
    json!({"facts": items}).to_string()
}

pub fn gaps_json(gaps: &[&str]) -> String {
    json!({"gaps": gaps}).to_string()
}

/// Cross-validation response marking every fact with one status.
pub fn validations_json(statuses: &[&str]) -> String {
    let items: Vec<_> = statuses
        .iter()
        .enumerate()
        .map(|(index, status)| json!({"index": index, "status": status}))
        .collect();
    json!({"validations": items}).to_string()
}

pub fn no_contradictions_json() -> String {
    json!({"contradictions": []}).to_string()
}

/// Gap-ranking response; `gaps` is `(description, importance)`.
pub fn gap_ranking_json(gaps: &[(&str, f64)]) -> String {
    let items: Vec<_> = gaps
        .iter()
        .map(|(description, importance)| {
            json!({
                "description": description,
                "importance": importance,
                "suggested_queries": [format!("search {description}")]
            })
        })
        .collect();
    json!({"gaps": items}).to_string()
}

/// Outline response with the given section headings.
pub fn outline_json(title: &str, summary: &str, headings: &[&str]) -> String {
    let sections: Vec<_> = headings
        .iter()
        .map(|h| json!({"heading": h, "key_points": [format!("cover {h}")]}))
        .collect();
    json!({"title": title, "summary": summary, "sections": sections}).to_string()
}

/// Section body citing source [1].
pub fn section_body(topic: &str) -> String {
    format!("This section discusses {topic} in detail [1].")
}
