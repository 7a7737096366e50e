//! Supadata tool family: scrape, transcripts, site map, crawl.

use futures::future::join_all;
use serde_json::{json, Value};

use crate::error::AgentError;

use super::SupadataSpec;

const API_BASE: &str = "https://api.supadata.ai/v1";

fn api_base() -> String {
    std::env::var("SUPADATA_API_BASE").unwrap_or_else(|_| API_BASE.to_string())
}

pub struct SupadataClient {
    api_key: String,
    client: reqwest::Client,
}

impl SupadataClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("SUPADATA_API_KEY").unwrap_or_default())
    }

    pub fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn get(&self, path: &str, params: Vec<(&str, String)>) -> Result<Value, AgentError> {
        let res = self
            .client
            .get(format!("{}/{}", api_base().trim_end_matches('/'), path))
            .header("x-api-key", &self.api_key)
            .query(&params)
            .send()
            .await
            .map_err(|e| AgentError::Tool(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Tool(format!("supadata error {status}: {body}")));
        }
        res.json().await.map_err(|e| AgentError::Tool(e.to_string()))
    }

    /// Scrapes each URL; failed URLs are dropped from the result.
    pub async fn scrape_urls(&self, urls: &[String], lang: &str, no_links: bool) -> Vec<Value> {
        let futures = urls.iter().map(|url| {
            self.get(
                "web/scrape",
                vec![
                    ("url", url.clone()),
                    ("lang", lang.to_string()),
                    ("noLinks", no_links.to_string()),
                ],
            )
        });
        join_all(futures)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// Fetches transcripts; failed URLs are dropped from the result.
    pub async fn fetch_transcripts(
        &self,
        urls: &[String],
        lang: &str,
        text: bool,
        mode: &str,
    ) -> Vec<Value> {
        let futures = urls.iter().map(|url| {
            self.get(
                "transcript",
                vec![
                    ("url", url.clone()),
                    ("lang", lang.to_string()),
                    ("text", text.to_string()),
                    ("mode", mode.to_string()),
                ],
            )
        });
        join_all(futures)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    pub async fn map_site(&self, url: &str) -> Option<Value> {
        self.get("web/map", vec![("url", url.to_string())])
            .await
            .ok()
    }

    pub async fn crawl_site(&self, url: &str, limit: u32) -> Option<Value> {
        self.get(
            "web/crawl",
            vec![("url", url.to_string()), ("limit", limit.to_string())],
        )
        .await
        .ok()
    }

    /// One enrichment pass for a Supadata spec. Returns None when nothing
    /// was requested, nothing succeeded, or the client is unavailable.
    pub async fn fetch(&self, spec: &SupadataSpec) -> Result<Option<Value>, AgentError> {
        if !self.available() {
            return Ok(None);
        }
        let mut result = serde_json::Map::new();

        if !spec.scrape_urls.is_empty() {
            let scrapes = self
                .scrape_urls(&spec.scrape_urls, &spec.lang, spec.no_links)
                .await;
            if !scrapes.is_empty() {
                result.insert("scrapes".to_string(), Value::Array(scrapes));
            }
        }
        if !spec.transcript_urls.is_empty() {
            let transcripts = self
                .fetch_transcripts(
                    &spec.transcript_urls,
                    &spec.lang,
                    spec.transcript_text,
                    &spec.transcript_mode,
                )
                .await;
            if !transcripts.is_empty() {
                result.insert("transcripts".to_string(), Value::Array(transcripts));
            }
        }
        if let Some(map_url) = &spec.map_url {
            if let Some(mapped) = self.map_site(map_url).await {
                result.insert("mapped".to_string(), mapped);
            }
        }
        if let Some(crawl_url) = &spec.crawl_url {
            let limit = spec.crawl_limit.unwrap_or(50);
            if let Some(crawl) = self.crawl_site(crawl_url, limit).await {
                result.insert("crawl".to_string(), crawl);
            }
        }

        if result.is_empty() {
            return Ok(None);
        }
        result.insert("requested_spec".to_string(), json!(spec));
        Ok(Some(Value::Object(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: unavailable client yields None without attempting calls.
    #[tokio::test]
    async fn unavailable_client_yields_none() {
        let client = SupadataClient::new("");
        let spec = SupadataSpec {
            scrape_urls: vec!["https://example.com".to_string()],
            ..Default::default()
        };
        assert!(client.fetch(&spec).await.unwrap().is_none());
    }
}
