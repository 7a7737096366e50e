//! Web tool family: search (query → URLs) and HTTP fetch (URLs → snippets).

use futures::future::join_all;
use serde_json::json;

use crate::error::AgentError;

const SEARCH_URL: &str = "https://api.exa.ai/search";
const SNIPPET_MAX_CHARS: usize = 500;

fn search_url() -> String {
    std::env::var("WEB_SEARCH_URL").unwrap_or_else(|_| SEARCH_URL.to_string())
}

/// Search client: query in, result URLs out.
pub struct WebSearchClient {
    api_key: String,
    client: reqwest::Client,
}

impl WebSearchClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("WEB_SEARCH_API_KEY").unwrap_or_default())
    }

    pub fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, AgentError> {
        if !self.available() {
            return Ok(Vec::new());
        }
        let res = self
            .client
            .post(search_url())
            .header("x-api-key", &self.api_key)
            .json(&json!({ "query": query, "numResults": top_k }))
            .send()
            .await
            .map_err(|e| AgentError::Tool(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Tool(format!("web search error {status}: {body}")));
        }
        let value: serde_json::Value = res
            .json()
            .await
            .map_err(|e| AgentError::Tool(e.to_string()))?;
        let urls = value
            .get("results")
            .and_then(|r| r.as_array())
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| r.get("url").and_then(|u| u.as_str()))
                    .map(String::from)
                    .take(top_k)
                    .collect()
            })
            .unwrap_or_default();
        Ok(urls)
    }
}

/// Plain HTTP fetcher producing text snippets.
pub struct HttpFetchClient {
    client: reqwest::Client,
}

impl Default for HttpFetchClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Crude tag stripper; snippets are prompt fodder, not rendered HTML.
fn strip_tags(body: &str) -> String {
    let mut out = String::with_capacity(body.len().min(SNIPPET_MAX_CHARS * 2));
    let mut in_tag = false;
    for ch in body.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl HttpFetchClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_one(&self, url: &str) -> Option<String> {
        let res = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(url, status = %r.status(), "fetch skipped");
                return None;
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "fetch failed");
                return None;
            }
        };
        let body = res.text().await.ok()?;
        let text = strip_tags(&body);
        if text.is_empty() {
            return None;
        }
        Some(text.chars().take(SNIPPET_MAX_CHARS).collect())
    }

    /// Fetches up to `limit` URLs concurrently; failed fetches are dropped,
    /// never raised.
    pub async fn fetch_many(&self, urls: &[String], limit: usize) -> Vec<String> {
        let futures = urls.iter().take(limit).map(|u| self.fetch_one(u));
        join_all(futures).await.into_iter().flatten().collect()
    }
}

/// Output of the web family for one pass.
#[derive(Clone, Debug)]
pub struct WebData {
    pub query: Option<String>,
    pub urls: Vec<String>,
    pub snippets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_flattens_markup() {
        let text = strip_tags("<html><body><h1>Title</h1><p>Body  text</p></body></html>");
        assert_eq!(text, "Title Body text");
    }

    /// **Scenario**: without an API key the searcher reports unavailable and
    /// returns no URLs instead of erroring.
    #[tokio::test]
    async fn unavailable_search_returns_empty() {
        let client = WebSearchClient::new("");
        assert!(!client.available());
        assert!(client.search("q", 3).await.unwrap().is_empty());
    }
}
