use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{Result, Tool, ToolError, optional_usize, require_str};

const DEFAULT_TOP_K: usize = 5;
const SEARCH_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Backend capable of answering a web query.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>>;
}

// ── Brave backend ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

/// Brave Search API backend.
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl BraveSearchProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.search.brave.com/res/v1/web/search";

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ToolError::network(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchProvider for BraveSearchProvider {
    async fn search(
        &self,
        query: &str,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}?q={}&count={}",
            self.base_url,
            urlencoding::encode(query),
            count
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::cancelled()),
            response = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .header("X-Subscription-Token", &self.api_key)
                .send() => response?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::upstream(format!("search API {status}: {body}")));
        }

        let parsed: BraveResponse = response
            .json()
            .await
            .map_err(|e| ToolError::parse(format!("search response: {e}")))?;

        Ok(parsed
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.description,
            })
            .collect())
    }
}

// ── Tool wrapper ────────────────────────────────────────────────────────────

/// `search` tool: ordered results, URL-deduplicated, blacklist filtered.
pub struct SearchTool {
    provider: Arc<dyn SearchProvider>,
    blacklist: Vec<String>,
}

impl SearchTool {
    /// Hosts dropped from every result set (shorteners and trackers whose
    /// pages carry no retrievable content).
    pub const DEFAULT_BLACKLIST: &'static [&'static str] =
        &["bit.ly", "t.co", "goo.gl", "tinyurl.com"];

    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            blacklist: Self::DEFAULT_BLACKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_blacklist(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.blacklist.extend(extra);
        self
    }

    fn is_blacklisted(&self, url: &str) -> bool {
        host_of(url)
            .map(|host| {
                self.blacklist
                    .iter()
                    .any(|b| host == *b || host.ends_with(&format!(".{b}")))
            })
            .unwrap_or(false)
    }

    /// Dedup by URL preserving order, drop blacklisted hosts, cap at top_k.
    fn filter(&self, results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
        let mut seen = HashSet::new();
        results
            .into_iter()
            .filter(|r| !self.is_blacklisted(&r.url))
            .filter(|r| seen.insert(r.url.clone()))
            .take(top_k)
            .collect()
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns an ordered list of {title, url, snippet}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "top_k": {"type": "integer", "minimum": 1, "maximum": 20, "default": DEFAULT_TOP_K}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> Result<Value> {
        let query = require_str(&args, "query")?;
        let top_k = optional_usize(&args, "top_k", DEFAULT_TOP_K);

        // Over-fetch so dedup/blacklist filtering can still fill top_k.
        let raw = self.provider.search(query, top_k * 2, cancel).await?;
        let results = self.filter(raw, top_k);

        tracing::debug!(query, results = results.len(), "search completed");
        serde_json::to_value(&results).map_err(|e| ToolError::parse(e.to_string()))
    }
}

/// Host portion of a URL, lowercased, without userinfo or port.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next()?;
    let without_userinfo = authority.rsplit('@').next()?;
    let host = without_userinfo.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedProvider(Vec<SearchResult>);

    #[async_trait]
    impl SearchProvider for CannedProvider {
        async fn search(
            &self,
            _query: &str,
            _count: usize,
            _cancel: &CancellationToken,
        ) -> Result<Vec<SearchResult>> {
            Ok(self.0.clone())
        }
    }

    fn hit(url: &str) -> SearchResult {
        SearchResult {
            title: url.to_string(),
            url: url.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://Example.com/a?b=c"), Some("example.com".into()));
        assert_eq!(host_of("http://user@host.io:8080/x"), Some("host.io".into()));
        assert_eq!(host_of("no-scheme.org/path"), Some("no-scheme.org".into()));
    }

    #[tokio::test]
    async fn dedup_and_blacklist() {
        let provider = Arc::new(CannedProvider(vec![
            hit("https://a.com/1"),
            hit("https://a.com/1"),
            hit("https://bit.ly/x"),
            hit("https://b.com/2"),
        ]));
        let tool = SearchTool::new(provider);

        let out = tool
            .invoke(json!({"query": "q"}), &CancellationToken::new())
            .await
            .unwrap();
        let results: Vec<SearchResult> = serde_json::from_value(out).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.com/1");
        assert_eq!(results[1].url, "https://b.com/2");
    }

    #[tokio::test]
    async fn top_k_caps_results() {
        let provider = Arc::new(CannedProvider(
            (0..10).map(|i| hit(&format!("https://s{i}.com"))).collect(),
        ));
        let tool = SearchTool::new(provider);

        let out = tool
            .invoke(json!({"query": "q", "top_k": 3}), &CancellationToken::new())
            .await
            .unwrap();
        let results: Vec<SearchResult> = serde_json::from_value(out).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn missing_query_is_invalid_args() {
        let tool = SearchTool::new(Arc::new(CannedProvider(vec![])));
        let err = tool
            .invoke(json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::ToolErrorKind::InvalidArgs);
    }

    #[test]
    fn subdomains_of_blacklisted_hosts_are_dropped() {
        let tool = SearchTool::new(Arc::new(CannedProvider(vec![])));
        assert!(tool.is_blacklisted("https://www.bit.ly/abc"));
        assert!(!tool.is_blacklisted("https://bitly-proxy.com/abc"));
    }
}
