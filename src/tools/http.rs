/// Outbound HTTP client shared by the web and stock tools.

use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use url::Url;

use crate::core::error::ToolError;

/// Some sites refuse requests without a browser-like agent.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Shared HTTP client with a fixed timeout ceiling and redirect following.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url`, treating non-2xx statuses as errors.
    pub async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.client.get(url).send().await?.error_for_status()
    }
}

/// Accept only absolute http(s) URLs.
pub fn validate_url(raw: &str) -> Result<Url, ToolError> {
    let raw = raw.trim();
    if raw.contains(&['\0', '\n', '\r'][..]) {
        return Err(ToolError::failed("Invalid URL: contains control characters"));
    }
    let parsed = Url::parse(raw).map_err(|e| ToolError::failed(format!("Invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ToolError::failed(format!("Invalid URL: unsupported scheme '{scheme}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_urls_are_accepted() {
        assert!(validate_url("https://example.com/page").is_ok());
        assert!(validate_url(" http://example.com ").is_ok());
        assert_eq!(
            validate_url("file:///etc/passwd").unwrap_err().to_string(),
            "Invalid URL: unsupported scheme 'file'"
        );
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
    }
}
