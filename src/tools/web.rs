/// Web Tools
///
/// fetch_url, crawl_links and search_web. All three go through the shared
/// `HttpClient`, so they inherit its timeout ceiling, redirect policy and
/// browser User-Agent. HTML is parsed with `scraper`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use crate::core::error::ToolError;
use crate::core::registry::{Arguments, RegistryError, ToolDescriptor, ToolHandler, ToolRegistry};
use crate::tools::http::{HttpClient, validate_url};
use crate::tools::{bool_arg, int_arg, required_str, str_arg, truncate_chars};

/// Ceiling on the characters returned by `fetch_url`.
pub const MAX_CONTENT_CHARS: usize = 50_000;
/// Ceiling on the links returned by `crawl_links`.
pub const MAX_LINKS: usize = 100;
/// Anchor text longer than this is cut.
pub const MAX_LINK_TEXT_CHARS: usize = 100;
pub const DEFAULT_SEARCH_RESULTS: i64 = 5;

/// Elements whose text never counts as page content.
const BOILERPLATE_ELEMENTS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

pub fn register(
    registry: &mut ToolRegistry,
    http: &HttpClient,
    search_url: &str,
) -> Result<(), RegistryError> {
    registry.register(
        ToolDescriptor::new(
            "fetch_url",
            "Fetch content from a URL and return it as text. Useful for web surfing.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The URL to fetch"
                    },
                    "extract_text": {
                        "type": "boolean",
                        "description": "If true, extract only text content from HTML (default: true)"
                    }
                },
                "required": ["url"]
            }),
        ),
        Arc::new(FetchUrl { http: http.clone() }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "crawl_links",
            "Crawl a webpage and extract all links from it.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The URL to crawl for links"
                    },
                    "filter_domain": {
                        "type": "string",
                        "description": "Optional: only return links from this domain"
                    }
                },
                "required": ["url"]
            }),
        ),
        Arc::new(CrawlLinks { http: http.clone() }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "search_web",
            "Search the web using DuckDuckGo and return results.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 5)"
                    }
                },
                "required": ["query"]
            }),
        ),
        Arc::new(SearchWeb {
            http: http.clone(),
            search_url: search_url.to_string(),
        }),
    )
}

fn selector(css: &str) -> Result<Selector, ToolError> {
    Selector::parse(css).map_err(|e| ToolError::Internal(format!("bad selector '{css}': {e}")))
}

/// Visible text of an HTML document, one trimmed non-empty line per line.
///
/// Text inside script, style, nav, footer and header elements is dropped.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| BOILERPLATE_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

/// Links found in `html`, resolved against `base` when root-relative.
///
/// Only http(s) links are kept. With `filter_domain`, a link is kept only if
/// its URL contains that string.
pub fn extract_links(
    html: &str,
    base: &Url,
    filter_domain: Option<&str>,
) -> Result<Vec<Link>, ToolError> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    let filter = filter_domain.filter(|domain| !domain.is_empty());

    let mut links = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = if href.starts_with('/') {
            match base.join(href) {
                Ok(joined) => joined.to_string(),
                Err(_) => continue,
            }
        } else {
            href.to_string()
        };

        if filter.is_some_and(|domain| !href.contains(domain)) {
            continue;
        }
        if !href.starts_with("http") {
            continue;
        }

        links.push(Link {
            url: href,
            text: truncate_chars(&element_text(anchor), MAX_LINK_TEXT_CHARS),
        });
        if links.len() == MAX_LINKS {
            break;
        }
    }
    Ok(links)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Parse a DuckDuckGo HTML results page. Results without a title are skipped
/// but still count toward `max`.
pub fn parse_search_results(html: &str, max: usize) -> Result<Vec<SearchResult>, ToolError> {
    let document = Html::parse_document(html);
    let result_sel = selector(".result")?;
    let title_sel = selector(".result__title")?;
    let snippet_sel = selector(".result__snippet")?;
    let link_sel = selector("a.result__a")?;

    let results = document
        .select(&result_sel)
        .take(max)
        .filter_map(|result| {
            let title = result.select(&title_sel).next()?;
            Some(SearchResult {
                title: element_text(title),
                snippet: result
                    .select(&snippet_sel)
                    .next()
                    .map(element_text)
                    .unwrap_or_default(),
                url: result
                    .select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect();
    Ok(results)
}

struct FetchUrl {
    http: HttpClient,
}

#[async_trait]
impl ToolHandler for FetchUrl {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let url = validate_url(required_str(&args, "url")?)?;
        let extract = bool_arg(&args, "extract_text").unwrap_or(true);

        let response = self.http.get(url.as_str()).await?;
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/html"));
        let body = response.text().await?;

        let content = if extract && is_html {
            extract_text(&body)
        } else {
            body
        };

        Ok(json!({
            "url": final_url,
            "status_code": status,
            "content": truncate_chars(&content, MAX_CONTENT_CHARS),
        }))
    }
}

struct CrawlLinks {
    http: HttpClient,
}

impl CrawlLinks {
    async fn crawl(&self, url: &Url, filter_domain: Option<&str>) -> Result<Vec<Link>, ToolError> {
        let html = self.http.get(url.as_str()).await?.text().await?;
        extract_links(&html, url, filter_domain)
    }
}

#[async_trait]
impl ToolHandler for CrawlLinks {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let raw = required_str(&args, "url")?;
        let url = validate_url(raw)?;
        let filter_domain = str_arg(&args, "filter_domain");

        let links = self
            .crawl(&url, filter_domain)
            .await
            .map_err(|e| ToolError::failed(format!("Error crawling URL: {e}")))?;
        Ok(json!({ "url": raw, "links": links }))
    }
}

struct SearchWeb {
    http: HttpClient,
    search_url: String,
}

impl SearchWeb {
    async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchResult>, ToolError> {
        let url = format!("{}?q={}", self.search_url, urlencoding::encode(query));
        let html = self.http.get(&url).await?.text().await?;
        parse_search_results(&html, max)
    }
}

#[async_trait]
impl ToolHandler for SearchWeb {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let query = required_str(&args, "query")?;
        let max = int_arg(&args, "max_results")?.unwrap_or(DEFAULT_SEARCH_RESULTS);
        let max = usize::try_from(max).unwrap_or(0);

        let results = self
            .search(query, max)
            .await
            .map_err(|e| ToolError::failed(format!("Error searching: {e}")))?;
        Ok(json!({ "query": query, "results": results }))
    }
}
