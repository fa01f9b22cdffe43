//! Web search tool backed by the Brave Search API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::Tool;

const SEARCH_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const SEARCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_COUNT: u32 = 5;

/// Searches the web and returns titled links
pub struct WebSearchTool;

impl WebSearchTool {
    pub const NAME: &'static str = "web_search";

    pub fn new() -> Self {
        Self
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchParams {
    query: String,
    count: Option<u32>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Search the web and return a numbered list of result titles and URLs. \
         Use for current events or information beyond your knowledge."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 20)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String, String> {
        let params: WebSearchParams =
            serde_json::from_value(params).map_err(|e| format!("Invalid params: {e}"))?;
        let count = params.count.unwrap_or(DEFAULT_COUNT).min(20);

        let results = web_search(&params.query, count).await?;
        if results.is_empty() {
            Ok("No results found.".to_string())
        } else {
            Ok(format_results(&results))
        }
    }
}

#[derive(Debug)]
struct SearchResult {
    title: String,
    url: String,
}

async fn web_search(query: &str, count: u32) -> Result<Vec<SearchResult>, String> {
    let api_key = std::env::var("BRAVE_API_KEY").map_err(|_| {
        "BRAVE_API_KEY environment variable not set. \
         Get an API key from https://brave.com/search/api/"
            .to_string()
    })?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(SEARCH_TIMEOUT_SECS))
        .user_agent(format!("Quill/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

    let count_param = count.to_string();
    let response = client
        .get(SEARCH_ENDPOINT)
        .query(&[("q", query), ("count", count_param.as_str())])
        .header("Accept", "application/json")
        .header("X-Subscription-Token", &api_key)
        .send()
        .await
        .map_err(|e| format!("Request failed: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!(
            "Search API error: {} {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            body
        ));
    }

    let parsed: BraveSearchResponse = response
        .json()
        .await
        .map_err(|e| format!("Failed to parse search response: {e}"))?;

    Ok(parsed
        .web
        .map(|web| {
            web.results
                .into_iter()
                .map(|r| SearchResult {
                    title: r.title,
                    url: r.url,
                })
                .collect()
        })
        .unwrap_or_default())
}

fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. [{}]({})", i + 1, r.title, r.url))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    title: String,
    url: String,
}
