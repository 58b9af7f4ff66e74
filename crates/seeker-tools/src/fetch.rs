use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{Result, Tool, ToolError, optional_usize, require_str, search::host_of};

const DEFAULT_MAX_BYTES: usize = 1_000_000;
const FETCH_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of one `fetch` call.
///
/// `status` is the HTTP status, or 0 for transport-level failures that the
/// tool chose to report as data (binary bodies keep their real status and
/// an empty `text`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub status: u16,
    pub content_type: String,
    pub text: String,
}

/// `fetch` tool: HTTP GET with main-content text extraction.
pub struct FetchTool {
    client: reqwest::Client,
}

impl FetchTool {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .user_agent("seeker-research/0.2")
            .build()
            .map_err(|e| ToolError::network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return extracted text content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "URL to fetch"},
                "max_bytes": {"type": "integer", "default": DEFAULT_MAX_BYTES}
            },
            "required": ["url"]
        })
    }

    fn rate_key(&self, args: &Value) -> String {
        args.get("url")
            .and_then(Value::as_str)
            .and_then(host_of)
            .unwrap_or_else(|| self.name().to_string())
    }

    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> Result<Value> {
        let url = require_str(&args, "url")?;
        let max_bytes = optional_usize(&args, "max_bytes", DEFAULT_MAX_BYTES);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::cancelled()),
            response = self.client.get(url).send() => response?,
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let body = read_capped(response, max_bytes, cancel).await?;
        let text = extract_text(&content_type, &body);

        let result = FetchResult {
            status,
            content_type,
            text,
        };
        tracing::debug!(url, status, bytes = body.len(), "fetch completed");
        serde_json::to_value(&result).map_err(|e| ToolError::parse(e.to_string()))
    }
}

/// Read at most `max_bytes` of the body, discarding the rest.
async fn read_capped(
    mut response: reqwest::Response,
    max_bytes: usize,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut body: Vec<u8> = Vec::new();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::cancelled()),
            chunk = response.chunk() => chunk?,
        };
        let Some(bytes) = chunk else { break };
        let remaining = max_bytes.saturating_sub(body.len());
        if remaining == 0 {
            break;
        }
        body.extend_from_slice(&bytes[..bytes.len().min(remaining)]);
    }
    Ok(body)
}

/// Reduce a response body to text according to its content type.
///
/// HTML goes through main-content extraction; plain text and JSON pass
/// through; anything binary yields empty text.
pub(crate) fn extract_text(content_type: &str, body: &[u8]) -> String {
    if content_type.contains("text/html") || looks_like_html(body) {
        return extract_html_text(&String::from_utf8_lossy(body));
    }
    if content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
    {
        return String::from_utf8_lossy(body).into_owned();
    }
    // PDF and office formats would be parsed here; binary content yields
    // empty text and the caller sees the non-zero status.
    String::new()
}

fn looks_like_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(512)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    head.contains("<!doctype html") || head.contains("<html")
}

/// Strip boilerplate and return readable text from an HTML document.
pub(crate) fn extract_html_text(html: &str) -> String {
    let document = scraper::Html::parse_document(html);

    // Prefer semantic main-content containers, fall back to body.
    let selectors = ["main", "article", "body"];
    for sel in selectors {
        let selector = scraper::Selector::parse(sel).expect("static selector");
        if let Some(element) = document.select(&selector).next() {
            let text = collect_text(element);
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Elements whose subtrees carry no readable content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "footer", "noscript", "head"];

fn collect_text(element: scraper::ElementRef<'_>) -> String {
    let mut out = String::new();
    walk(element, &mut out);
    out
}

fn walk(element: scraper::ElementRef<'_>, out: &mut String) {
    if SKIPPED_ELEMENTS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(trimmed);
            }
        } else if let Some(child_element) = scraper::ElementRef::wrap(child) {
            walk(child_element, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_reduced_to_text() {
        let html = r#"<!DOCTYPE html>
            <html><head><title>T</title><style>.x{}</style></head>
            <body><nav>menu</nav><main><h1>Heading</h1>
            <p>First paragraph.</p><script>var x = 1;</script>
            <p>Second paragraph.</p></main><footer>foot</footer></body></html>"#;

        let text = extract_text("text/html", html.as_bytes());
        assert!(text.contains("Heading"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("menu"));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("text/plain; charset=utf-8", b"hello world");
        assert_eq!(text, "hello world");
    }

    #[test]
    fn binary_yields_empty_text() {
        let text = extract_text("application/octet-stream", &[0u8, 159, 146, 150]);
        assert!(text.is_empty());
    }

    #[test]
    fn sniffs_html_without_content_type() {
        let text = extract_text("", b"<html><body><p>sniffed</p></body></html>");
        assert!(text.contains("sniffed"));
    }

    #[test]
    fn rate_key_is_target_host() {
        let tool = FetchTool::new().unwrap();
        assert_eq!(
            tool.rate_key(&json!({"url": "https://docs.rs/tokio"})),
            "docs.rs"
        );
        assert_eq!(tool.rate_key(&json!({})), "fetch");
    }
}
