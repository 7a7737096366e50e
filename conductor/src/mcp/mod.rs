//! MCP tool layer: typed specs, input sanitization, and enrichment outputs.
//!
//! Three tool families (web search + HTTP fetch, YouTube metadata, Supadata
//! scrape/transcript), each guarded by its own breaker and retry policy in
//! `McpIntegrationService`.

pub mod service;
pub mod supadata;
pub mod web;
pub mod youtube;

pub use service::{McpIntegrationService, ToolKind};
pub use supadata::SupadataClient;
pub use web::{HttpFetchClient, WebSearchClient};
pub use youtube::YouTubeClient;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool-priority policy for one enrichment pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPriority {
    SupadataFirst,
    Parallel,
}

fn default_lang() -> String {
    "ko".to_string()
}

fn default_transcript_mode() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

/// YouTube sub-spec of an MCP spec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YoutubeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_username: Option<String>,
    #[serde(default)]
    pub video_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default = "default_true")]
    pub fetch_channel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(default = "default_true")]
    pub restrict_to_channel: bool,
}

impl Default for YoutubeSpec {
    fn default() -> Self {
        Self {
            channel_id: None,
            channel_handle: None,
            channel_username: None,
            video_ids: Vec::new(),
            search_query: None,
            fetch_channel: true,
            max_results: None,
            restrict_to_channel: true,
        }
    }
}

/// Supadata sub-spec of an MCP spec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupadataSpec {
    #[serde(default)]
    pub scrape_urls: Vec<String>,
    #[serde(default)]
    pub transcript_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_limit: Option<u32>,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub no_links: bool,
    #[serde(default)]
    pub transcript_text: bool,
    #[serde(default = "default_transcript_mode")]
    pub transcript_mode: String,
}

impl Default for SupadataSpec {
    fn default() -> Self {
        Self {
            scrape_urls: Vec::new(),
            transcript_urls: Vec::new(),
            map_url: None,
            crawl_url: None,
            crawl_limit: None,
            lang: default_lang(),
            no_links: false,
            transcript_text: false,
            transcript_mode: default_transcript_mode(),
        }
    }
}

impl SupadataSpec {
    pub fn is_empty(&self) -> bool {
        self.scrape_urls.is_empty()
            && self.transcript_urls.is_empty()
            && self.map_url.is_none()
            && self.crawl_url.is_none()
    }
}

/// Per-agent MCP spec built from state and agent policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct McpSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_priority: Option<ToolPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<YoutubeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supadata: Option<SupadataSpec>,
}

impl McpSpec {
    /// A spec with nothing to fetch drives no tool call.
    pub fn is_empty(&self) -> bool {
        self.search_query.as_deref().map(str::trim).unwrap_or("").is_empty()
            && self.urls.is_empty()
            && self.youtube.is_none()
            && self.supadata.as_ref().map(|s| s.is_empty()).unwrap_or(true)
    }
}

fn clean_urls(urls: &[String], max_n: usize) -> Vec<String> {
    let mut out = Vec::new();
    for u in urls {
        let trimmed = u.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            continue;
        }
        out.push(trimmed.to_string());
        if out.len() >= max_n {
            break;
        }
    }
    out
}

/// Input sanitization applied before every dispatch. Idempotent: sanitizing
/// an already-sanitized spec changes nothing.
pub fn sanitize_spec(spec: &McpSpec) -> McpSpec {
    let mut safe = spec.clone();
    safe.urls = clean_urls(&safe.urls, 6);
    if let Some(limit) = safe.web_limit {
        safe.web_limit = Some(limit.clamp(1, 6));
    }
    if let Some(yt) = safe.youtube.as_mut() {
        yt.video_ids.truncate(10);
        yt.video_ids.retain(|v| !v.trim().is_empty());
    }
    if let Some(sup) = safe.supadata.as_mut() {
        sup.scrape_urls = clean_urls(&sup.scrape_urls, 8);
        sup.transcript_urls = clean_urls(&sup.transcript_urls, 5);
        if let Some(limit) = sup.crawl_limit {
            sup.crawl_limit = Some(limit.clamp(1, 200));
        }
    }
    safe
}

/// Execution record for one tool call. Every outcome is reflected here and
/// in the breaker.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub breaker: String,
    pub breaker_state: String,
    pub fail_max: u32,
    pub reset_timeout: u64,
    pub timeout_s: u64,
    pub max_retries: u32,
    pub attempts: u32,
    pub ok: bool,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub started_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Web portion of the source attribution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Where the enrichment came from.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExternalSources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supadata: Option<SupadataSpec>,
}

/// Output of one enrichment pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_snippets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_sources: Option<ExternalSources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_insights: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supadata: Option<Value>,
    #[serde(default)]
    pub tool_policy: HashMap<String, ToolExecutionRecord>,
}

impl Enrichment {
    /// True when no tool produced data (records may still exist).
    pub fn has_data(&self) -> bool {
        self.external_snippets.is_some()
            || self.youtube_insights.is_some()
            || self.supadata.is_some()
    }

    /// Sorted names of the populated output keys, for audit records.
    pub fn enriched_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if self.external_snippets.is_some() {
            keys.push("external_snippets".to_string());
        }
        if self.external_sources.is_some() {
            keys.push("external_sources".to_string());
        }
        if self.supadata.is_some() {
            keys.push("supadata".to_string());
        }
        if self.youtube_insights.is_some() {
            keys.push("youtube_insights".to_string());
        }
        keys
    }

    /// URLs attributed to the web tool, for the second-pass scrape.
    pub fn web_urls(&self) -> Vec<String> {
        self.external_sources
            .as_ref()
            .and_then(|s| s.web.as_ref())
            .map(|w| w.urls.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty_spec() -> McpSpec {
        McpSpec {
            search_query: Some("creator trends".to_string()),
            urls: vec![
                "https://a.example".to_string(),
                "ftp://blocked.example".to_string(),
                "javascript:alert(1)".to_string(),
                "https://b.example".to_string(),
                "https://c.example".to_string(),
                "https://d.example".to_string(),
                "https://e.example".to_string(),
                "https://f.example".to_string(),
                "https://g.example".to_string(),
            ],
            web_limit: Some(99),
            tool_priority: Some(ToolPriority::SupadataFirst),
            youtube: Some(YoutubeSpec {
                video_ids: (0..15).map(|i| format!("vid{i}")).collect(),
                ..Default::default()
            }),
            supadata: Some(SupadataSpec {
                scrape_urls: (0..12).map(|i| format!("https://s{i}.example")).collect(),
                transcript_urls: (0..9).map(|i| format!("https://t{i}.example")).collect(),
                crawl_limit: Some(9999),
                ..Default::default()
            }),
        }
    }

    /// **Scenario**: non-http(s) schemes are dropped and list caps applied.
    #[test]
    fn sanitize_drops_schemes_and_caps() {
        let safe = sanitize_spec(&dirty_spec());
        assert_eq!(safe.urls.len(), 6);
        assert!(safe.urls.iter().all(|u| u.starts_with("https://")));
        assert_eq!(safe.web_limit, Some(6));
        assert_eq!(safe.youtube.as_ref().unwrap().video_ids.len(), 10);
        let sup = safe.supadata.as_ref().unwrap();
        assert_eq!(sup.scrape_urls.len(), 8);
        assert_eq!(sup.transcript_urls.len(), 5);
        assert_eq!(sup.crawl_limit, Some(200));
    }

    /// **Scenario**: sanitizing an already-sanitized spec is a no-op.
    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_spec(&dirty_spec());
        let twice = sanitize_spec(&once);
        assert_eq!(once, twice);
    }

    /// **Scenario**: a spec with no queries, urls or sub-specs is empty.
    #[test]
    fn empty_spec_detection() {
        assert!(McpSpec::default().is_empty());
        let with_query = McpSpec {
            search_query: Some("q".to_string()),
            ..Default::default()
        };
        assert!(!with_query.is_empty());
        let blank_supadata = McpSpec {
            supadata: Some(SupadataSpec::default()),
            ..Default::default()
        };
        assert!(blank_supadata.is_empty());
    }
}
