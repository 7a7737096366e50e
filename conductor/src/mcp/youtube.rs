//! YouTube metadata tool family.
//!
//! Channel overview, video details by id, and channel-restricted search.
//! Sub-fetches run concurrently; any single success yields a result, while
//! attempted-and-all-failed raises so the retry/breaker machinery engages.

use serde_json::{json, Value};

use crate::error::AgentError;

use super::YoutubeSpec;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

fn api_base() -> String {
    std::env::var("YOUTUBE_API_BASE").unwrap_or_else(|_| API_BASE.to_string())
}

pub struct YouTubeClient {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("YOUTUBE_API_KEY").unwrap_or_default())
    }

    pub fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, AgentError> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("key", self.api_key.clone()));
        let res = self
            .client
            .get(format!("{}/{}", api_base().trim_end_matches('/'), path))
            .query(&query)
            .send()
            .await
            .map_err(|e| AgentError::Tool(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Tool(format!("youtube error {status}: {body}")));
        }
        res.json().await.map_err(|e| AgentError::Tool(e.to_string()))
    }

    /// Resolves a channel id from id/handle/username hints, in that order.
    pub async fn resolve_channel_id(&self, spec: &YoutubeSpec) -> Option<String> {
        if let Some(id) = &spec.channel_id {
            if !id.is_empty() {
                return Some(id.clone());
            }
        }
        let lookup = if let Some(handle) = &spec.channel_handle {
            Some(("forHandle", handle.clone()))
        } else {
            spec.channel_username
                .as_ref()
                .map(|u| ("forUsername", u.clone()))
        };
        let (param, value) = lookup?;
        let result = self
            .get("channels", &[("part", "id".to_string()), (param, value)])
            .await
            .ok()?;
        result
            .get("items")
            .and_then(|i| i.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("id"))
            .and_then(|id| id.as_str())
            .map(String::from)
    }

    async fn channel_overview(
        &self,
        channel_id: &str,
        max_results: u32,
    ) -> Result<Value, AgentError> {
        let info = self
            .get(
                "channels",
                &[
                    ("part", "snippet,statistics".to_string()),
                    ("id", channel_id.to_string()),
                ],
            )
            .await?;
        let channel_info = info
            .get("items")
            .and_then(|i| i.as_array())
            .and_then(|a| a.first())
            .cloned()
            .unwrap_or(Value::Null);
        let videos = self
            .get(
                "search",
                &[
                    ("part", "snippet".to_string()),
                    ("channelId", channel_id.to_string()),
                    ("order", "date".to_string()),
                    ("type", "video".to_string()),
                    ("maxResults", max_results.to_string()),
                ],
            )
            .await?;
        let recent_videos = videos.get("items").cloned().unwrap_or(Value::Array(vec![]));
        Ok(json!({
            "channel_info": channel_info,
            "recent_videos": recent_videos,
        }))
    }

    async fn video_details(&self, video_ids: &[String]) -> Result<Value, AgentError> {
        self.get(
            "videos",
            &[
                ("part", "snippet,statistics".to_string()),
                ("id", video_ids.join(",")),
            ],
        )
        .await
    }

    async fn search_videos(
        &self,
        query: &str,
        max_results: u32,
        channel_id: Option<&str>,
    ) -> Result<Value, AgentError> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("q", query.to_string()),
            ("type", "video".to_string()),
            ("maxResults", max_results.to_string()),
            ("order", "relevance".to_string()),
        ];
        if let Some(cid) = channel_id {
            params.push(("channelId", cid.to_string()));
        }
        let result = self.get("search", &params).await?;
        Ok(result.get("items").cloned().unwrap_or(Value::Array(vec![])))
    }

    /// One enrichment pass for a YouTube spec. Returns None when nothing was
    /// requested or the client is unavailable; errors only when calls were
    /// attempted and every one of them failed.
    pub async fn fetch(
        &self,
        spec: &YoutubeSpec,
        context_query: Option<&str>,
    ) -> Result<Option<Value>, AgentError> {
        if !self.available() {
            return Ok(None);
        }
        let resolved_channel = self.resolve_channel_id(spec).await;
        let max_results = spec.max_results.unwrap_or(5);

        let overview_fut = async {
            match (&resolved_channel, spec.fetch_channel) {
                (Some(cid), true) => Some(self.channel_overview(cid, max_results).await),
                _ => None,
            }
        };
        let details_fut = async {
            if spec.video_ids.is_empty() {
                None
            } else {
                Some(self.video_details(&spec.video_ids).await)
            }
        };
        let search_query = spec
            .search_query
            .as_deref()
            .or(context_query)
            .map(String::from);
        let search_fut = async {
            match &search_query {
                Some(q) => {
                    let channel = if spec.restrict_to_channel {
                        resolved_channel.as_deref()
                    } else {
                        spec.channel_id.as_deref()
                    };
                    Some(self.search_videos(q, max_results, channel).await)
                }
                None => None,
            }
        };

        let (overview, details, search) = tokio::join!(overview_fut, details_fut, search_fut);
        let attempted = overview.is_some() || details.is_some() || search.is_some();

        let mut had_error = false;
        let mut unwrap_branch = |branch: Option<Result<Value, AgentError>>| match branch {
            Some(Ok(v)) => Some(v),
            Some(Err(e)) => {
                tracing::debug!(error = %e, "youtube sub-fetch failed");
                had_error = true;
                None
            }
            None => None,
        };
        let overview = unwrap_branch(overview);
        let details = unwrap_branch(details);
        let search = unwrap_branch(search);

        if overview.is_none() && details.is_none() && search.is_none() {
            if attempted && had_error {
                return Err(AgentError::Tool("youtube_fetch_failed".to_string()));
            }
            return Ok(None);
        }

        Ok(Some(json!({
            "channel_overview": overview,
            "video_details": details,
            "search_results": search,
            "channel_id": resolved_channel.or_else(|| spec.channel_id.clone()),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: without an API key, fetch is a clean no-op rather than a
    /// breaker-counted failure.
    #[tokio::test]
    async fn unavailable_client_fetches_nothing() {
        let client = YouTubeClient::new("");
        let spec = YoutubeSpec {
            channel_id: Some("UC123".to_string()),
            ..Default::default()
        };
        assert!(client.fetch(&spec, None).await.unwrap().is_none());
    }

    /// **Scenario**: an explicit channel id short-circuits resolution with no
    /// network call.
    #[tokio::test]
    async fn explicit_channel_id_resolves_directly() {
        let client = YouTubeClient::new("");
        let spec = YoutubeSpec {
            channel_id: Some("UC999".to_string()),
            channel_handle: Some("@handle".to_string()),
            ..Default::default()
        };
        assert_eq!(client.resolve_channel_id(&spec).await.as_deref(), Some("UC999"));
    }
}
