//! Web search and page fetch tools.
//!
//! Search scrapes the DuckDuckGo HTML endpoint; fetch reduces a page to its
//! main text. Both are deliberately thin: result quality is the oracle's
//! problem, not the orchestrator's.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::io::config::ToolsConfig;
use crate::io::oracle::ToolDefinition;
use crate::io::tools::{Tool, ToolError, ToolSet};

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const STRIPPED_TAGS: [&str; 8] = [
    "script", "style", "nav", "header", "footer", "aside", "form", "iframe",
];

static RESULT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("result link regex")
});
static RESULT_SNIPPET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(?:a|div)[^>]*class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</(?:a|div)>"#)
        .expect("result snippet regex")
});
static STRIPPED_TAG_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    STRIPPED_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("tag regex"))
        .collect()
});
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("heading regex"));
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("list item regex"));
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|div|br|tr|section|ul|ol|table|blockquote|pre)\b[^>]*>")
        .expect("block regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"));

/// One search result, optionally with fetched page content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Shared HTTP client for the web tools.
#[derive(Debug, Clone)]
pub struct WebClient {
    client: reqwest::Client,
    limit_chars: usize,
}

impl WebClient {
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build web client")?;
        Ok(Self {
            client,
            limit_chars: config.fetch_limit_chars,
        })
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[("q", query)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolError::Failed(format!("search request failed: {e}")))?;
        let html = response
            .text()
            .await
            .map_err(|e| ToolError::Failed(format!("read search results: {e}")))?;
        let hits = parse_search_results(&html, max_results);
        debug!(hits = hits.len(), "search completed");
        Ok(hits)
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        let parsed = Url::parse(url).map_err(|e| ToolError::InvalidArguments(format!("bad url: {e}")))?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        let html = response
            .text()
            .await
            .map_err(|e| ToolError::Failed(format!("read page body: {e}")))?;
        Ok(html_to_text(&html, self.limit_chars))
    }
}

/// Extract result title, url and snippet from DuckDuckGo HTML.
///
/// A snippet belongs to the link it follows; results without one get `None`.
pub fn parse_search_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let links: Vec<regex::Captures<'_>> = RESULT_LINK_RE.captures_iter(html).collect();

    links
        .iter()
        .enumerate()
        .filter_map(|(idx, caps)| {
            let url = resolve_result_url(&decode_entities(&caps[1]))?;
            let block_start = caps.get(0).map_or(0, |m| m.end());
            let block_end = links
                .get(idx + 1)
                .and_then(|next| next.get(0))
                .map_or(html.len(), |m| m.start());
            let snippet = RESULT_SNIPPET_RE
                .captures(&html[block_start..block_end])
                .map(|snippet| clean_inline(&snippet[1]))
                .filter(|s| !s.is_empty());
            Some(SearchHit {
                title: clean_inline(&caps[2]),
                url,
                snippet,
                content: None,
            })
        })
        .take(max_results)
        .collect()
}

/// DuckDuckGo wraps result links in a redirect carrying the target in `uddg`.
fn resolve_result_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    if url.path().starts_with("/l/") {
        return url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned());
    }
    Some(url.to_string())
}

/// Reduce an HTML page to its main text, headings kept as `#` lines, one
/// block per paragraph, truncated to `limit_chars` characters.
pub fn html_to_text(html: &str, limit_chars: usize) -> String {
    let mut body = COMMENT_RE.replace_all(html, "").into_owned();
    for re in &*STRIPPED_TAG_RES {
        body = re.replace_all(&body, "").into_owned();
    }
    let main = main_region(&body).to_string();

    let with_headings = HEADING_RE.replace_all(&main, |caps: &regex::Captures<'_>| {
        let level = caps[1].parse::<usize>().unwrap_or(1);
        format!("\n{} {}\n", "#".repeat(level), clean_inline(&caps[2]))
    });
    let with_items = LIST_ITEM_RE.replace_all(&with_headings, "\n- ");
    let with_blocks = BLOCK_RE.replace_all(&with_items, "\n");
    let stripped = TAG_RE.replace_all(&with_blocks, "");
    let decoded = decode_entities(&stripped);

    let text = decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty() && line != "-")
        .collect::<Vec<_>>()
        .join("\n\n");

    match text.char_indices().nth(limit_chars) {
        Some((byte_idx, _)) => format!("{}\n\n[truncated]", &text[..byte_idx]),
        None => text,
    }
}

/// Prefer `<main>`, then `<article>`, then `<body>`, then the whole document.
fn main_region(html: &str) -> &str {
    let lowered = html.to_ascii_lowercase();
    for tag in ["main", "article", "body"] {
        let open = format!("<{tag}");
        let close = format!("</{tag}>");
        let Some(start) = lowered.find(&open) else {
            continue;
        };
        let Some(content_start) = lowered[start..].find('>').map(|i| start + i + 1) else {
            continue;
        };
        let end = lowered[content_start..]
            .find(&close)
            .map_or(html.len(), |i| content_start + i);
        return &html[content_start..end];
    }
    html
}

fn clean_inline(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, "");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn query_schema(default_max: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "minLength": 1, "description": "The search query string"},
            "max_results": {
                "type": "integer",
                "minimum": 1,
                "maximum": 10,
                "description": format!("Maximum number of results (default: {default_max})")
            }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

fn query_arguments(arguments: &Value, default_max: usize) -> Result<(String, usize), ToolError> {
    let query = arguments
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("query must be a string".to_string()))?;
    let max_results = arguments
        .get("max_results")
        .and_then(Value::as_u64)
        .map_or(default_max, |n| n as usize);
    Ok((query.to_string(), max_results))
}

fn to_json(hits: &[SearchHit]) -> Result<String, ToolError> {
    serde_json::to_string_pretty(hits).map_err(|e| ToolError::Failed(format!("encode results: {e}")))
}

pub struct SearchTool {
    web: Arc<WebClient>,
    default_max: usize,
}

#[async_trait]
impl Tool for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search".to_string(),
            description: "Search the web and return a list of results with title, url, and snippet."
                .to_string(),
            parameters: query_schema(self.default_max),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let (query, max_results) = query_arguments(&arguments, self.default_max)?;
        let hits = self.web.search(&query, max_results).await?;
        to_json(&hits)
    }
}

pub struct FetchTool {
    web: Arc<WebClient>,
}

#[async_trait]
impl Tool for FetchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch".to_string(),
            description: "Fetch a webpage and return its main content as text.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "minLength": 1, "description": "The URL to fetch"}
                },
                "required": ["url"],
                "additionalProperties": false
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let url = arguments
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("url must be a string".to_string()))?;
        let content = self.web.fetch(url).await?;
        serde_json::to_string_pretty(&json!({"url": url, "content": content}))
            .map_err(|e| ToolError::Failed(format!("encode page: {e}")))
    }
}

pub struct SearchAndFetchTool {
    web: Arc<WebClient>,
    default_max: usize,
}

#[async_trait]
impl Tool for SearchAndFetchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_and_fetch".to_string(),
            description: "Search and fetch content from top results in one step.".to_string(),
            parameters: query_schema(self.default_max),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let (query, max_results) = query_arguments(&arguments, self.default_max)?;
        let mut hits = self.web.search(&query, max_results).await?;
        for hit in &mut hits {
            hit.content = Some(match self.web.fetch(&hit.url).await {
                Ok(content) => content,
                Err(err) => format!("Failed to fetch: {err}"),
            });
        }
        to_json(&hits)
    }
}

/// The default tool set: `search`, `fetch` and `search_and_fetch`.
pub fn web_tools(config: &ToolsConfig) -> Result<ToolSet> {
    let web = Arc::new(WebClient::new(config)?);
    Ok(ToolSet::new()
        .with(SearchTool {
            web: Arc::clone(&web),
            default_max: config.search_max_results,
        })
        .with(FetchTool {
            web: Arc::clone(&web),
        })
        .with(SearchAndFetchTool {
            web,
            default_max: config.fetch_max_results,
        }))
}
