use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use seeker_tools::{
    Result, SearchProvider, SearchResult, SearchTool, Tool, ToolRegistry,
};
use seeker_types::{EventSink, SessionId};

/// Search provider serving canned results.
///
/// Query-specific results win; anything else gets the default set.
#[derive(Default)]
pub struct CannedSearchProvider {
    by_query: HashMap<String, Vec<SearchResult>>,
    default: Vec<SearchResult>,
}

impl CannedSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, results: Vec<SearchResult>) -> Self {
        self.default = results;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        self.by_query.insert(query.into(), results);
        self
    }
}

#[async_trait]
impl SearchProvider for CannedSearchProvider {
    async fn search(
        &self,
        query: &str,
        _count: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        Ok(self
            .by_query
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Convenience builder for a canned hit.
pub fn hit(title: &str, url: &str, snippet: &str) -> SearchResult {
    SearchResult {
        title: title.to_string(),
        url: url.to_string(),
        snippet: snippet.to_string(),
    }
}

/// Fetch tool serving fixed page text per URL.
#[derive(Default)]
pub struct StaticFetchTool {
    pages: HashMap<String, String>,
}

impl StaticFetchTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }
}

#[async_trait]
impl Tool for StaticFetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return extracted text content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: &CancellationToken) -> Result<Value> {
        let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
        match self.pages.get(url) {
            Some(text) => Ok(json!({"status": 200, "content_type": "text/html", "text": text})),
            None => Ok(json!({"status": 404, "content_type": "", "text": ""})),
        }
    }
}

/// Registry with a canned search tool and a static fetch tool, wired to
/// the given sink.
pub fn canned_registry(
    session_id: SessionId,
    sink: Arc<dyn EventSink>,
    provider: CannedSearchProvider,
    fetch: StaticFetchTool,
) -> Arc<ToolRegistry> {
    Arc::new(
        ToolRegistry::new(session_id)
            .with_sink(sink)
            .register(Arc::new(SearchTool::new(Arc::new(provider))))
            .register(Arc::new(fetch)),
    )
}
