//! URL fetching tool
//!
//! HTML responses are stripped of noise elements and converted to markdown
//! before being handed to the model; other content types pass through as-is.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{clip_to_boundary, Tool};

const DEFAULT_MAX_LENGTH: usize = 20_000;
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Fetches a URL and reduces the body to readable text
pub struct FetchUrlTool;

impl FetchUrlTool {
    pub const NAME: &'static str = "fetch_url";

    pub fn new() -> Self {
        Self
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct FetchUrlParams {
    url: String,
    max_length: Option<usize>,
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Fetch the content of a URL. HTML pages are converted to markdown. \
         Use for reading documentation, articles, or API responses."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch"
                },
                "max_length": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 20000)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String, String> {
        let params: FetchUrlParams =
            serde_json::from_value(params).map_err(|e| format!("Invalid params: {e}"))?;
        fetch_url(&params.url, params.max_length).await
    }
}

async fn fetch_url(url: &str, max_length: Option<usize>) -> Result<String, String> {
    let max_length = max_length.unwrap_or(DEFAULT_MAX_LENGTH);

    let parsed = url::Url::parse(url).map_err(|e| format!("Invalid URL: {e}"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!(
            "Unsupported URL scheme: {}. Only http and https are allowed.",
            parsed.scheme()
        ));
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(format!("Quill/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Request failed: {e}"))?;

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if !status.is_success() {
        return Err(format!(
            "HTTP error: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ));
    }

    let text = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response body: {e}"))?;
    let original_len = text.len();

    let is_html = content_type.contains("text/html")
        || text.trim_start().starts_with("<!DOCTYPE")
        || text.trim_start().starts_with("<html");

    let mut content = if is_html {
        let cleaned = strip_html_noise(&text);
        htmd::convert(&cleaned).unwrap_or(cleaned)
    } else {
        text
    };

    if content.len() > max_length {
        let total = content.len();
        let end = clip_to_boundary(&content, max_length);
        content.truncate(end);
        content.push_str(&format!(
            "\n\n[... truncated, {end} of {total} chars shown]"
        ));
    }

    Ok(format!(
        "[URL: {url}]\n[Content-Type: {content_type}]\n[Size: {original_len} bytes]\n\n{content}"
    ))
}

/// Drop elements that carry no readable content before markdown conversion
fn strip_html_noise(html: &str) -> String {
    use fancy_regex::Regex;

    let script_re = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let html = script_re.replace_all(html, "");

    let style_re = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let html = style_re.replace_all(&html, "");

    let noise_re = Regex::new(r"(?is)<(nav|header|footer|aside|noscript)[^>]*>.*?</\1>").unwrap();
    let html = noise_re.replace_all(&html, "");

    let comment_re = Regex::new(r"(?s)<!--.*?-->").unwrap();
    let html = comment_re.replace_all(&html, "");

    let svg_re = Regex::new(r"(?is)<svg[^>]*>.*?</svg>").unwrap();
    let html = svg_re.replace_all(&html, "");

    html.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_fetches_plain_text() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/notes.txt");
            then.status(200)
                .header("content-type", "text/plain")
                .body("plain contents");
        });

        let tool = FetchUrlTool::new();
        let url = server.url("/notes.txt");
        let output = tool.execute(json!({ "url": url })).await.unwrap();

        assert!(output.contains(&format!("[URL: {url}]")));
        assert!(output.contains("text/plain"));
        assert!(output.contains("plain contents"));
    }

    #[tokio::test]
    async fn test_converts_html_to_markdown() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html><head><script>var x = 1;</script></head><body><h1>Title</h1><p>Body text</p></body></html>");
        });

        let tool = FetchUrlTool::new();
        let output = tool
            .execute(json!({ "url": server.url("/page") }))
            .await
            .unwrap();

        assert!(output.contains("# Title"));
        assert!(output.contains("Body text"));
        assert!(!output.contains("var x"));
        assert!(!output.contains("<h1>"));
    }

    #[tokio::test]
    async fn test_truncates_long_bodies() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/big");
            then.status(200)
                .header("content-type", "text/plain")
                .body("a".repeat(500));
        });

        let tool = FetchUrlTool::new();
        let output = tool
            .execute(json!({ "url": server.url("/big"), "max_length": 100 }))
            .await
            .unwrap();

        assert!(output.contains("[... truncated, 100 of 500 chars shown]"));
    }

    #[tokio::test]
    async fn test_rejects_unsupported_scheme() {
        let tool = FetchUrlTool::new();
        let err = tool
            .execute(json!({"url": "ftp://example.com/file"}))
            .await
            .unwrap_err();
        assert!(err.contains("Unsupported URL scheme"));
    }

    #[tokio::test]
    async fn test_reports_http_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let tool = FetchUrlTool::new();
        let err = tool
            .execute(json!({ "url": server.url("/missing") }))
            .await
            .unwrap_err();
        assert!(err.contains("HTTP error: 404"));
    }

    #[test]
    fn test_strip_html_noise() {
        let html = "<nav>menu</nav><!-- note --><style>.a{}</style><p>kept</p>";
        let cleaned = strip_html_noise(html);
        assert!(cleaned.contains("<p>kept</p>"));
        assert!(!cleaned.contains("menu"));
        assert!(!cleaned.contains("note"));
        assert!(!cleaned.contains(".a{}"));
    }
}
