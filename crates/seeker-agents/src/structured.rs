use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use seeker_llm::{ChatClient, ChatMessage, ChatOptions};

use crate::{Error, Result};

// NOTE: LLMs return JSON wrapped in prose, code fences, or with trailing
// commentary often enough that strict parsing alone loses usable output.
// Extraction tries, in order: the raw text, fenced blocks, and the widest
// brace-balanced substring. A response that still fails gets exactly one
// repair retry with a "return only the JSON" instruction before the call
// surfaces as Malformed.

/// Pull the first parseable JSON value out of a model response.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // Fenced block.
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let rest = &trimmed[start + fence.len()..];
            if let Some(end) = rest.find("```") {
                if let Ok(value) = serde_json::from_str(rest[..end].trim()) {
                    return Some(value);
                }
            }
        }
    }

    // Widest object or array substring.
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Parse a model response into `T` via JSON extraction.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    let value =
        extract_json(text).ok_or_else(|| Error::Malformed(format!("no JSON found in: {text}")))?;
    serde_json::from_value(value).map_err(|e| Error::Malformed(e.to_string()))
}

/// One chat call with structured output and a single auto-repair retry.
///
/// `schema_hint` is a human-readable JSON shape embedded in the repair
/// prompt, e.g. `{"facts": [{"content": "...", "source_url": "...", "confidence": 0.0}]}`.
pub async fn ask_structured<T: DeserializeOwned>(
    client: &dyn ChatClient,
    messages: &[ChatMessage],
    options: &ChatOptions,
    schema_hint: &str,
    cancel: &CancellationToken,
) -> Result<T> {
    let response = client.chat(messages, options, cancel).await?;
    match parse_structured::<T>(&response.message.content) {
        Ok(parsed) => Ok(parsed),
        Err(first_error) => {
            tracing::debug!(error = %first_error, "structured parse failed, repairing");

            let mut repair: Vec<ChatMessage> = messages.to_vec();
            repair.push(response.message.clone());
            repair.push(ChatMessage::user(format!(
                "Your previous answer was not valid JSON. Return ONLY the JSON matching this \
                 schema, with no code fences and no commentary:\n{schema_hint}"
            )));

            let retried = client.chat(&repair, options, cancel).await?;
            parse_structured::<T>(&retried.message.content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        a: u32,
        b: String,
    }

    #[test]
    fn parses_raw_json() {
        let parsed: Pair = parse_structured(r#"{"a": 1, "b": "x"}"#).unwrap();
        assert_eq!(parsed, Pair { a: 1, b: "x".into() });
    }

    #[test]
    fn parses_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 2, \"b\": \"y\"}\n```\nHope that helps!";
        let parsed: Pair = parse_structured(text).unwrap();
        assert_eq!(parsed.a, 2);
    }

    #[test]
    fn parses_embedded_object() {
        let text = "The answer is {\"a\": 3, \"b\": \"z\"} as requested.";
        let parsed: Pair = parse_structured(text).unwrap();
        assert_eq!(parsed.a, 3);
    }

    #[test]
    fn parses_array_response() {
        let value = extract_json("result: [1, 2, 3]").unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_structured::<Pair>("no json here at all").unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn schema_mismatch_is_malformed() {
        let err = parse_structured::<Pair>(r#"{"wrong": true}"#).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }
}
