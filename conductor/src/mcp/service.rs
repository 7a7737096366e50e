//! MCP integration service: tool execution under breaker + retry + timeout,
//! and the per-pass tool-priority policy.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::breaker::{circuit_breaker_manager, CircuitBreakerManager, CircuitState};
use crate::config::{Settings, ToolPolicy};
use crate::error::AgentError;

use super::web::{HttpFetchClient, WebData, WebSearchClient};
use super::{
    sanitize_spec, Enrichment, ExternalSources, McpSpec, SupadataClient, ToolExecutionRecord,
    ToolPriority, WebSource, YouTubeClient,
};

/// The three tool families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Web,
    Youtube,
    Supadata,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Web => "web",
            ToolKind::Youtube => "youtube",
            ToolKind::Supadata => "supadata",
        }
    }

    pub fn breaker_name(&self) -> &'static str {
        match self {
            ToolKind::Web => "mcp_web",
            ToolKind::Youtube => "mcp_youtube",
            ToolKind::Supadata => "mcp_supadata",
        }
    }
}

/// Web fetch request extracted from a spec.
#[derive(Clone, Debug)]
struct WebFetchSpec {
    search_query: Option<String>,
    urls: Vec<String>,
    limit: usize,
}

/// Collects external data via the MCP tool families to enrich agent contexts.
///
/// **Interaction**: one shared instance behind `Arc`; the orchestrator's tool
/// worker and the creator agent call `enrich_context`/`run_tool`.
pub struct McpIntegrationService {
    web_search: WebSearchClient,
    http_fetch: HttpFetchClient,
    youtube: YouTubeClient,
    supadata: SupadataClient,
    web_policy: ToolPolicy,
    youtube_policy: ToolPolicy,
    supadata_policy: ToolPolicy,
    breakers: Arc<CircuitBreakerManager>,
}

impl McpIntegrationService {
    /// Production wiring: clients from env, policies from settings, breakers
    /// from the process-wide manager.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            web_search: WebSearchClient::from_env(),
            http_fetch: HttpFetchClient::new(),
            youtube: YouTubeClient::from_env(),
            supadata: SupadataClient::from_env(),
            web_policy: settings.web_policy.clone(),
            youtube_policy: settings.youtube_policy.clone(),
            supadata_policy: settings.supadata_policy.clone(),
            breakers: circuit_breaker_manager(),
        }
    }

    pub fn with_breaker_manager(mut self, manager: Arc<CircuitBreakerManager>) -> Self {
        self.breakers = manager;
        self
    }

    pub fn set_policy(&mut self, kind: ToolKind, policy: ToolPolicy) {
        match kind {
            ToolKind::Web => self.web_policy = policy,
            ToolKind::Youtube => self.youtube_policy = policy,
            ToolKind::Supadata => self.supadata_policy = policy,
        }
    }

    pub fn breaker_manager(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    fn policy(&self, kind: ToolKind) -> &ToolPolicy {
        match kind {
            ToolKind::Web => &self.web_policy,
            ToolKind::Youtube => &self.youtube_policy,
            ToolKind::Supadata => &self.supadata_policy,
        }
    }

    /// Executes one tool call under the policy for its kind:
    /// breaker-open short-circuit, per-attempt timeout, retries with
    /// exponential backoff plus jitter. A breaker opening mid-retry
    /// interrupts the loop. Empty-but-successful results come back as
    /// `(None, record { ok: false })`.
    pub async fn run_tool<T, F, Fut>(&self, kind: ToolKind, factory: F) -> (Option<T>, ToolExecutionRecord)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<T>, AgentError>>,
    {
        let policy = self.policy(kind).clone();
        let breaker = self.breakers.get_breaker(
            kind.breaker_name(),
            policy.fail_max,
            Duration::from_secs(policy.reset_timeout_secs),
        );
        let started = Instant::now();
        let mut record = ToolExecutionRecord {
            breaker: kind.breaker_name().to_string(),
            breaker_state: breaker.current_state().as_str().to_string(),
            fail_max: policy.fail_max,
            reset_timeout: policy.reset_timeout_secs,
            timeout_s: policy.timeout_secs,
            max_retries: policy.max_retries,
            attempts: 0,
            ok: false,
            skipped: false,
            last_error: None,
            started_at_ms: chrono::Utc::now().timestamp_millis(),
            duration_ms: None,
        };

        if breaker.current_state() == CircuitState::Open {
            record.skipped = true;
            record.last_error = Some("circuit_open".to_string());
            record.duration_ms = Some(started.elapsed().as_millis() as u64);
            return (None, record);
        }

        for attempt in 1..=policy.max_retries + 1 {
            record.attempts = attempt;
            if breaker.current_state() == CircuitState::Open {
                record.skipped = true;
                record.last_error = Some("circuit_open".to_string());
                record.breaker_state = breaker.current_state().as_str().to_string();
                record.duration_ms = Some(started.elapsed().as_millis() as u64);
                return (None, record);
            }

            let message = match tokio::time::timeout(
                Duration::from_secs(policy.timeout_secs),
                factory(),
            )
            .await
            {
                Ok(Ok(value)) => {
                    breaker.success();
                    record.ok = value.is_some();
                    record.breaker_state = breaker.current_state().as_str().to_string();
                    record.duration_ms = Some(started.elapsed().as_millis() as u64);
                    return (value, record);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timeout after {}s", policy.timeout_secs),
            };

            breaker.failure(&message);
            record.last_error = Some(message);
            record.breaker_state = breaker.current_state().as_str().to_string();

            if attempt <= policy.max_retries {
                let backoff = (policy.backoff_base_secs * 2f64.powi(attempt as i32 - 1))
                    .min(policy.backoff_max_secs);
                let jitter = if policy.jitter_secs > 0.0 {
                    rand::thread_rng().gen_range(0.0..policy.jitter_secs)
                } else {
                    0.0
                };
                tokio::time::sleep(Duration::from_secs_f64((backoff + jitter).max(0.0))).await;
            }
        }

        record.duration_ms = Some(started.elapsed().as_millis() as u64);
        (None, record)
    }

    fn extract_web_spec(spec: &McpSpec) -> Option<WebFetchSpec> {
        let query = spec
            .search_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(String::from);
        if query.is_none() && spec.urls.is_empty() {
            return None;
        }
        Some(WebFetchSpec {
            search_query: query,
            urls: spec.urls.clone(),
            limit: spec.web_limit.unwrap_or(3) as usize,
        })
    }

    async fn fetch_web(&self, spec: &WebFetchSpec) -> Result<Option<WebData>, AgentError> {
        let mut urls = spec.urls.clone();
        if urls.is_empty() {
            if let Some(query) = &spec.search_query {
                if self.web_search.available() {
                    urls = self.web_search.search(query, spec.limit).await?;
                }
            }
        }
        if urls.is_empty() {
            return Ok(None);
        }
        let snippets = self.http_fetch.fetch_many(&urls, spec.limit).await;
        Ok(Some(WebData {
            query: spec.search_query.clone(),
            urls,
            snippets,
        }))
    }

    /// One enrichment pass: sanitize the spec, fetch per the tool-priority
    /// policy, and assemble outputs plus per-tool execution records.
    pub async fn enrich_context(
        &self,
        spec: &McpSpec,
        context_query: Option<&str>,
    ) -> Enrichment {
        let spec = sanitize_spec(spec);
        let mut enrichment = Enrichment::default();
        if spec.is_empty() {
            return enrichment;
        }

        if let Some(yt) = &spec.youtube {
            let (data, record) = self
                .run_tool(ToolKind::Youtube, || self.youtube.fetch(yt, context_query))
                .await;
            enrichment
                .tool_policy
                .insert("youtube".to_string(), record);
            enrichment.youtube_insights = data;
        }

        let web_spec = Self::extract_web_spec(&spec);
        let sup_spec = spec.supadata.clone().filter(|s| !s.is_empty());
        let priority = spec.tool_priority;

        let mut web_data: Option<WebData> = None;
        let mut sup_data: Option<serde_json::Value> = None;

        match priority {
            Some(ToolPriority::Parallel) => {
                let web_branch = async {
                    match &web_spec {
                        Some(ws) => Some(self.run_tool(ToolKind::Web, || self.fetch_web(ws)).await),
                        None => None,
                    }
                };
                let sup_branch = async {
                    match &sup_spec {
                        Some(ss) => {
                            Some(self.run_tool(ToolKind::Supadata, || self.supadata.fetch(ss)).await)
                        }
                        None => None,
                    }
                };
                let (web_out, sup_out) = tokio::join!(web_branch, sup_branch);
                if let Some((data, record)) = web_out {
                    enrichment.tool_policy.insert("web".to_string(), record);
                    web_data = data;
                }
                if let Some((data, record)) = sup_out {
                    enrichment.tool_policy.insert("supadata".to_string(), record);
                    sup_data = data;
                }
            }
            Some(ToolPriority::SupadataFirst) => {
                if let Some(ss) = &sup_spec {
                    let (data, record) = self
                        .run_tool(ToolKind::Supadata, || self.supadata.fetch(ss))
                        .await;
                    enrichment.tool_policy.insert("supadata".to_string(), record);
                    sup_data = data;
                }
                if sup_data.is_none() {
                    if let Some(ws) = &web_spec {
                        let (data, record) =
                            self.run_tool(ToolKind::Web, || self.fetch_web(ws)).await;
                        enrichment.tool_policy.insert("web".to_string(), record);
                        web_data = data;
                    }
                }
            }
            None => {
                if let Some(ws) = &web_spec {
                    let (data, record) = self.run_tool(ToolKind::Web, || self.fetch_web(ws)).await;
                    enrichment.tool_policy.insert("web".to_string(), record);
                    web_data = data;
                }
                if let Some(ss) = &sup_spec {
                    let (data, record) = self
                        .run_tool(ToolKind::Supadata, || self.supadata.fetch(ss))
                        .await;
                    enrichment.tool_policy.insert("supadata".to_string(), record);
                    sup_data = data;
                }
            }
        }

        if let Some(wd) = web_data {
            if !wd.snippets.is_empty() {
                enrichment.external_snippets = Some(wd.snippets);
                enrichment
                    .external_sources
                    .get_or_insert_with(ExternalSources::default)
                    .web = Some(WebSource {
                    query: wd.query,
                    urls: wd.urls,
                });
            }
        }
        if let Some(sd) = sup_data {
            enrichment.supadata = Some(sd);
            enrichment
                .external_sources
                .get_or_insert_with(ExternalSources::default)
                .supadata = sup_spec;
        }

        enrichment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> ToolPolicy {
        ToolPolicy {
            fail_max: 3,
            reset_timeout_secs: 30,
            timeout_secs: 1,
            max_retries,
            backoff_base_secs: 0.01,
            backoff_max_secs: 0.02,
            jitter_secs: 0.0,
        }
    }

    fn service(max_retries: u32) -> McpIntegrationService {
        let settings = Settings::default();
        let mut svc = McpIntegrationService::from_settings(&settings)
            .with_breaker_manager(Arc::new(CircuitBreakerManager::new()));
        svc.set_policy(ToolKind::Web, fast_policy(max_retries));
        svc.set_policy(ToolKind::Supadata, fast_policy(max_retries));
        svc
    }

    /// **Scenario**: breaker open at call start short-circuits with
    /// skipped=true ∧ ok=false ∧ last_error="circuit_open"; the skip does not
    /// count as a breaker failure.
    #[tokio::test]
    async fn open_breaker_short_circuits() {
        let svc = service(1);
        let breaker = svc.breakers.get_breaker("mcp_web", 3, Duration::from_secs(30));
        breaker.failure("a");
        breaker.failure("b");
        breaker.failure("c");
        assert_eq!(breaker.current_state(), CircuitState::Open);
        let failures_before = breaker.snapshot().failures;

        let (data, record) = svc
            .run_tool(ToolKind::Web, || async { Ok(Some(1u32)) })
            .await;
        assert!(data.is_none());
        assert!(record.skipped);
        assert!(!record.ok);
        assert_eq!(record.last_error.as_deref(), Some("circuit_open"));
        assert_eq!(breaker.snapshot().failures, failures_before);
    }

    /// **Scenario**: one failure then success within the retry budget; the
    /// record shows two attempts and ok=true.
    #[tokio::test]
    async fn retries_then_succeeds() {
        let svc = service(1);
        let calls = AtomicU32::new(0);
        let (data, record) = svc
            .run_tool(ToolKind::Web, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AgentError::Tool("transient".to_string()))
                    } else {
                        Ok(Some("payload".to_string()))
                    }
                }
            })
            .await;
        assert_eq!(data.as_deref(), Some("payload"));
        assert!(record.ok);
        assert_eq!(record.attempts, 2);
        assert!(!record.skipped);
    }

    /// **Scenario**: retry exhaustion returns (None, ok=false) with the last
    /// error preserved and breaker failures counted per attempt.
    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let svc = service(1);
        let (data, record) = svc
            .run_tool::<u32, _, _>(ToolKind::Web, || async {
                Err(AgentError::Tool("boom".to_string()))
            })
            .await;
        assert!(data.is_none());
        assert!(!record.ok);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.last_error.as_deref(), Some("tool error: boom"));
        let snap = svc.breakers.status("mcp_web").unwrap();
        assert_eq!(snap.failures, 2);
    }

    /// **Scenario**: a breaker that opens mid-retry interrupts the loop with
    /// circuit_open instead of burning the remaining attempts.
    #[tokio::test]
    async fn breaker_opening_interrupts_retries() {
        let mut svc = service(5);
        svc.set_policy(
            ToolKind::Web,
            ToolPolicy {
                fail_max: 2,
                ..fast_policy(5)
            },
        );
        let (data, record) = svc
            .run_tool::<u32, _, _>(ToolKind::Web, || async {
                Err(AgentError::Tool("down".to_string()))
            })
            .await;
        assert!(data.is_none());
        assert!(record.skipped);
        assert_eq!(record.last_error.as_deref(), Some("circuit_open"));
        // Two failing attempts opened the breaker; the third loop iteration
        // observed it open.
        assert_eq!(record.attempts, 3);
    }

    /// **Scenario**: a successful call with no data is canonical
    /// (None, ok=false) and counts as breaker success.
    #[tokio::test]
    async fn empty_success_is_canonical() {
        let svc = service(1);
        let (data, record) = svc
            .run_tool::<u32, _, _>(ToolKind::Web, || async { Ok(None) })
            .await;
        assert!(data.is_none());
        assert!(!record.ok);
        assert!(!record.skipped);
        assert!(record.last_error.is_none());
        assert_eq!(svc.breakers.status("mcp_web").unwrap().successes, 1);
    }

    /// **Scenario**: a timeout counts as a failure attempt.
    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let svc = service(0);
        let (data, record) = svc
            .run_tool::<u32, _, _>(ToolKind::Web, || async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                Ok(Some(1))
            })
            .await;
        assert!(data.is_none());
        assert!(!record.ok);
        assert!(record.last_error.unwrap_or_default().contains("timeout"));
    }

    /// **Scenario**: an empty spec produces an empty enrichment with no tool
    /// records.
    #[tokio::test]
    async fn empty_spec_is_noop() {
        let svc = service(1);
        let enrichment = svc.enrich_context(&McpSpec::default(), None).await;
        assert!(!enrichment.has_data());
        assert!(enrichment.tool_policy.is_empty());
    }
}
