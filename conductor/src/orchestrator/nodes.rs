//! Orchestrator graph nodes.
//!
//! Every node catches its own failures: errors are appended to the state and
//! the run continues, so the final synthesizer can always produce an answer.
//! Corrective jumps (replan, RAG re-entry) consume one unit of the loop
//! budget at the jump site.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::{
    AnalyticsAgent, CollectionConfig, CompetencyAgent, CompetencyAssessment, CompetencyResponse,
    DataCollectionAgent, DeepAgents, IntegrationAgent, Mission, MissionAgent,
    MissionCandidateProfile, MissionFilters, OnboardingSummary, RecommendationAgent, ReportType,
    SearchAgent,
};
use crate::error::AgentError;
use crate::graph::{Next, Node};
use crate::llm::router::route_request;
use crate::llm::{GenerateOptions, GenerationEngine};
use crate::mcp::{McpIntegrationService, McpSpec, SupadataSpec};
use crate::rag::{HistoryTurn, QueryType, RagPipeline, RagUserContext};

use super::planner::{should_plan, Planner};
use super::router::{should_use_rag, IntentAnalyzer};
use super::state::{
    CostPreference, OrchestratorState, Routing, ToolEnrichmentOutcome, WorkflowType,
};

/// Weak-answer markers for the RAG quality gate. Literal, configurable list:
/// Korean first, English fallbacks after.
pub const UNCERTAINTY_MARKERS: &[&str] = &[
    "잘 모르",
    "알 수 없",
    "확인할 수 없",
    "찾을 수 없",
    "제공된 문서",
    "근거가 없",
    "정보가 없",
    "추가 정보",
    "확실하지",
    "추정",
    "cannot",
    "unknown",
    "not sure",
    "insufficient",
];

/// Dependencies shared by every node.
pub(crate) struct Shared {
    pub generation: Arc<GenerationEngine>,
    pub rag: Arc<RagPipeline>,
    pub mcp: Arc<McpIntegrationService>,
    pub intent: IntentAnalyzer,
    pub planner: Planner,
    pub deep: DeepAgents,
    pub mission: MissionAgent,
    pub analytics: AnalyticsAgent,
    pub competency: CompetencyAgent,
    pub recommendation: RecommendationAgent,
    pub search: SearchAgent,
    pub integration: IntegrationAgent,
    pub data_collection: DataCollectionAgent,
}

/// Graph node id for a workflow's entry stage.
pub(crate) fn workflow_node(workflow: WorkflowType) -> &'static str {
    match workflow {
        WorkflowType::DeepAgents => "deep_agents_processing",
        WorkflowType::Rag => "rag_processing",
        WorkflowType::Competency => "competency_diagnosis",
        WorkflowType::Recommendation => "recommendation",
        WorkflowType::Mission => "mission_recommendation",
        WorkflowType::Search => "vector_search",
        WorkflowType::Analytics => "analytics",
        WorkflowType::DataCollection => "data_collection",
        WorkflowType::General => "llm_manager",
    }
}

fn context_str(state: &OrchestratorState, key: &str) -> Option<String> {
    state
        .context
        .get(key)
        .and_then(Value::as_str)
        .map(String::from)
}

fn context_strings(state: &OrchestratorState, key: &str) -> Vec<String> {
    state
        .context
        .get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn dedup_strings(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for v in values {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() || !seen.insert(trimmed.clone()) {
            continue;
        }
        out.push(trimmed);
    }
    out
}

// ---------------------------------------------------------------------------
// route_request

pub(crate) struct RouteRequestNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for RouteRequestNode {
    fn id(&self) -> &str {
        "route_request"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let Some(text) = state.latest_user_text().map(String::from) else {
            state.add_error("처리할 메시지가 없습니다");
            return Ok((state, Next::Continue));
        };

        if self.shared.deep.should_use_deep_agents(&text) {
            state.workflow_type = WorkflowType::DeepAgents;
            state.use_deep_agents = true;
            state.routing = Routing {
                strategy: "deep_agents_gate".to_string(),
                intent: None,
                confidence: 1.0,
                raw: None,
            };
        } else {
            let result = self.shared.intent.analyze(&text).await;
            state.workflow_type = match result.intent.as_str() {
                "competency_assessment" => WorkflowType::Competency,
                "recommendation" => WorkflowType::Recommendation,
                "mission_matching" => WorkflowType::Mission,
                "search" => WorkflowType::Search,
                "analytics" => WorkflowType::Analytics,
                "data_collection" => WorkflowType::DataCollection,
                _ => {
                    if should_use_rag(&text) {
                        WorkflowType::Rag
                    } else {
                        WorkflowType::General
                    }
                }
            };
            state.routing = Routing {
                strategy: "slm_intent".to_string(),
                intent: Some(result.intent),
                confidence: result.confidence,
                raw: Some(result.raw),
            };
        }

        state.current_step = "routed".to_string();
        let preview: String = text.chars().take(100).collect();
        state.add_audit(
            "route_request",
            HashMap::from([
                (
                    "workflow_type".to_string(),
                    json!(state.workflow_type.as_str()),
                ),
                ("message_preview".to_string(), json!(preview)),
            ]),
        );
        tracing::info!(workflow = state.workflow_type.as_str(), "request routed");
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// plan_request

pub(crate) struct PlanRequestNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for PlanRequestNode {
    fn id(&self) -> &str {
        "plan_request"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let Some(text) = state.latest_user_text().map(String::from) else {
            return Ok((state, Next::Continue));
        };

        if !should_plan(state.workflow_type, state.routing.confidence, &text) {
            state.plan = None;
            return Ok((state, Next::Continue));
        }

        let plan = self
            .shared
            .planner
            .plan(&text, state.workflow_type, state.routing.confidence)
            .await;
        state.workflow_type = plan.workflow_type;
        state.use_deep_agents = plan.workflow_type == WorkflowType::DeepAgents;
        state.add_audit(
            "plan_request",
            HashMap::from([(
                "plan".to_string(),
                serde_json::to_value(&plan).unwrap_or(Value::Null),
            )]),
        );
        state.plan = Some(plan);
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// tool_enrichment

pub(crate) struct ToolEnrichmentNode {
    pub shared: Arc<Shared>,
}

impl ToolEnrichmentNode {
    /// Per-agent MCP spec from the run context plus agent policy.
    fn build_mcp_spec(state: &OrchestratorState) -> McpSpec {
        let mut spec: McpSpec = state
            .context
            .get("mcp")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        match state.workflow_type {
            WorkflowType::Mission => {
                if let Some(profile) = state.context.get("creator_profile") {
                    let get = |key: &str| profile.get(key).and_then(Value::as_str);

                    let mut youtube = spec.youtube.clone().unwrap_or_default();
                    if youtube.channel_id.is_none() {
                        youtube.channel_id = get("youtube_channel_id")
                            .or_else(|| get("channel_id"))
                            .map(String::from);
                    }
                    if youtube.channel_handle.is_none() {
                        youtube.channel_handle = get("youtube_handle")
                            .or_else(|| get("creator_handle"))
                            .map(String::from);
                    }
                    if youtube != crate::mcp::YoutubeSpec::default() {
                        spec.youtube = Some(youtube);
                    }

                    if spec.search_query.is_none() {
                        let keywords: Vec<String> = profile
                            .get("keywords")
                            .or_else(|| profile.get("tags"))
                            .and_then(Value::as_array)
                            .map(|a| {
                                a.iter()
                                    .filter_map(Value::as_str)
                                    .take(3)
                                    .map(String::from)
                                    .collect()
                            })
                            .unwrap_or_default();
                        if !keywords.is_empty() {
                            spec.search_query = Some(format!("{} 미션 캠페인", keywords.join(", ")));
                        }
                    }

                    let mut scrape_candidates: Vec<String> = profile
                        .get("social_links")
                        .and_then(Value::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(Value::as_str)
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default();
                    for key in [
                        "instagram_url",
                        "tiktok_url",
                        "youtube_url",
                        "twitter_url",
                        "facebook_url",
                        "website",
                    ] {
                        if let Some(url) = get(key) {
                            scrape_candidates.push(url.to_string());
                        }
                    }
                    let recent_videos: Vec<String> = profile
                        .get("recent_video_urls")
                        .and_then(Value::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(Value::as_str)
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default();

                    if !scrape_candidates.is_empty() || !recent_videos.is_empty() {
                        let mut supadata = spec.supadata.clone().unwrap_or_default();
                        if !scrape_candidates.is_empty() {
                            supadata.scrape_urls = dedup_strings(
                                supadata
                                    .scrape_urls
                                    .iter()
                                    .cloned()
                                    .chain(scrape_candidates),
                            );
                        }
                        if !recent_videos.is_empty() {
                            supadata.transcript_urls = dedup_strings(
                                supadata
                                    .transcript_urls
                                    .iter()
                                    .cloned()
                                    .chain(recent_videos),
                            );
                        }
                        spec.supadata = Some(supadata);
                    }
                }
            }
            WorkflowType::Analytics => {
                if let Some(filters) = state.context.get("filters") {
                    if let Some(filter_spec) = filters
                        .get("mcp")
                        .and_then(|v| serde_json::from_value::<McpSpec>(v.clone()).ok())
                    {
                        if spec.search_query.is_none() {
                            spec.search_query = filter_spec.search_query;
                        }
                        if spec.urls.is_empty() {
                            spec.urls = filter_spec.urls;
                        }
                        if spec.youtube.is_none() {
                            spec.youtube = filter_spec.youtube;
                        }
                    }
                    if spec.supadata.is_none() {
                        spec.supadata = filters
                            .get("supadata")
                            .and_then(|v| serde_json::from_value::<SupadataSpec>(v.clone()).ok());
                    }
                }
            }
            _ => {}
        }
        spec
    }

    fn route(state: &mut OrchestratorState) -> Next {
        let needs_tools = state.plan.as_ref().map(|p| p.needs_tools).unwrap_or(false);
        let failed = matches!(
            state.tool_enrichment_result.reason.as_deref(),
            Some("error") | Some("no_spec_or_service")
        );
        if needs_tools && failed && state.loop_count < state.max_loops {
            state.loop_count += 1;
            return Next::Node("replan_request".to_string());
        }
        Next::Node(workflow_node(state.workflow_type).to_string())
    }
}

#[async_trait]
impl Node<OrchestratorState> for ToolEnrichmentNode {
    fn id(&self) -> &str {
        "tool_enrichment"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let needs_tools = state.plan.as_ref().map(|p| p.needs_tools).unwrap_or(false);
        let cost_pref = state
            .plan
            .as_ref()
            .map(|p| p.cost_preference)
            .unwrap_or(CostPreference::Balanced);
        let toolish = matches!(
            state.workflow_type,
            WorkflowType::Mission | WorkflowType::Analytics | WorkflowType::DataCollection
        );

        if !(needs_tools || toolish) {
            state.tool_enrichment_result = ToolEnrichmentOutcome {
                ran: false,
                reason: Some("not_needed".to_string()),
                ..Default::default()
            };
            let next = Self::route(&mut state);
            return Ok((state, next));
        }

        let user_text = state.latest_user_text().map(String::from).unwrap_or_default();
        let mut spec = Self::build_mcp_spec(&state);

        // Planner-requested tools get a more aggressive spec unless the
        // budget preference forbids it.
        if needs_tools && cost_pref != CostPreference::Budget {
            if spec.search_query.is_none() && !user_text.is_empty() {
                spec.search_query = Some(user_text.clone());
            }
            spec.web_limit = Some(spec.web_limit.unwrap_or(6).clamp(1, 6));
            if spec.tool_priority.is_none() {
                spec.tool_priority = Some(if cost_pref == CostPreference::Speed {
                    crate::mcp::ToolPriority::Parallel
                } else {
                    crate::mcp::ToolPriority::SupadataFirst
                });
            }
        }

        if spec.is_empty() {
            state.tool_enrichment_result = ToolEnrichmentOutcome {
                ran: false,
                reason: Some("no_spec_or_service".to_string()),
                needs_tools,
                ..Default::default()
            };
            let next = Self::route(&mut state);
            return Ok((state, next));
        }

        let mut enrichment = self
            .shared
            .mcp
            .enrich_context(&spec, Some(&user_text))
            .await;

        // Second pass: planner wanted tools, web produced URLs but supadata
        // produced nothing yet, so scrape those URLs.
        if needs_tools && cost_pref != CostPreference::Budget && enrichment.supadata.is_none() {
            let urls = enrichment.web_urls();
            if !urls.is_empty() {
                let second = self
                    .shared
                    .mcp
                    .enrich_context(
                        &McpSpec {
                            supadata: Some(SupadataSpec {
                                scrape_urls: urls,
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        None,
                    )
                    .await;
                if second.supadata.is_some() {
                    enrichment.supadata = second.supadata;
                    for (k, v) in second.tool_policy {
                        enrichment.tool_policy.insert(k, v);
                    }
                }
            }
        }

        // Tools were required but every attempted tool came back dataless.
        let attempted_failure = needs_tools
            && !enrichment.has_data()
            && enrichment.tool_policy.values().any(|r| !r.ok);

        state.tool_enrichment_result = ToolEnrichmentOutcome {
            ran: true,
            reason: Some(if attempted_failure { "error" } else { "ok" }.to_string()),
            agent_key: Some(state.workflow_type.as_str().to_string()),
            needs_tools,
            cost_preference: Some(cost_pref.as_str().to_string()),
            enriched_keys: enrichment.enriched_keys(),
            tool_policy: enrichment.tool_policy.clone(),
            error: None,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        };
        state.add_audit(
            "tool_enrichment",
            HashMap::from([
                ("agent_key".to_string(), json!(state.workflow_type.as_str())),
                ("needs_tools".to_string(), json!(needs_tools)),
                (
                    "enriched_keys".to_string(),
                    json!(state.tool_enrichment_result.enriched_keys),
                ),
            ]),
        );
        state.mcp_enrichment = Some(enrichment);

        let next = Self::route(&mut state);
        Ok((state, next))
    }
}

// ---------------------------------------------------------------------------
// replan_request

pub(crate) struct ReplanRequestNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for ReplanRequestNode {
    fn id(&self) -> &str {
        "replan_request"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let Some(text) = state.latest_user_text().map(String::from) else {
            return Ok((state, Next::Continue));
        };

        let routing_summary = serde_json::to_string(&state.routing).unwrap_or_default();
        let tool_summary =
            serde_json::to_string(&state.tool_enrichment_result).unwrap_or_default();
        let rag_docs_count = state.retrieved_documents.len();
        let rag_preview: String = state
            .rag_result
            .as_ref()
            .map(|r| r.response.chars().take(500).collect())
            .unwrap_or_default();

        let mut plan = self
            .shared
            .planner
            .replan(
                &text,
                state.workflow_type,
                &routing_summary,
                state.plan.as_ref(),
                rag_docs_count,
                &rag_preview,
                &tool_summary,
            )
            .await;

        // Policy hardening: a search workflow always re-enters RAG downstream.
        if plan.workflow_type == WorkflowType::Search {
            plan.needs_rag = true;
        }
        state.workflow_type = plan.workflow_type;

        // A replanned needs_rag invalidates stale RAG output so the stage
        // actually re-enters.
        if plan.needs_rag && state.rag_result.is_some() {
            state.clear_rag_outputs();
        }

        state.add_audit(
            "replan_request",
            HashMap::from([
                (
                    "plan".to_string(),
                    serde_json::to_value(&plan).unwrap_or(Value::Null),
                ),
                ("loop_count".to_string(), json!(state.loop_count)),
            ]),
        );
        state.plan = Some(plan);
        state.replan_result = super::state::ReplanOutcome {
            ran: true,
            loop_count: state.loop_count,
            error: None,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        };
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// deep_agents_processing

pub(crate) struct DeepAgentsNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for DeepAgentsNode {
    fn id(&self) -> &str {
        "deep_agents_processing"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let text = state.latest_user_text().map(String::from).unwrap_or_default();
        let outcome = self.shared.deep.execute(&text).await;

        state.performance_metrics.insert(
            "deep_agents".to_string(),
            json!({
                "success": outcome.success,
                "iterations": outcome.iterations,
                "quality_score": outcome.quality_score,
            }),
        );
        state.add_audit(
            "deep_agents_processing",
            HashMap::from([
                ("success".to_string(), json!(outcome.success)),
                ("iterations".to_string(), json!(outcome.iterations)),
                ("quality_score".to_string(), json!(outcome.quality_score)),
            ]),
        );
        state.use_deep_agents = true;

        if !outcome.success {
            state.add_error("Deep agents 실행이 실패했습니다");
            state.deep_agents_result = serde_json::to_value(&outcome).ok();
            return Ok((state, Next::Node("final_synthesis".to_string())));
        }

        let metadata = outcome.result.get("metadata").cloned().unwrap_or(Value::Null);
        state.deep_agents_result = serde_json::to_value(&outcome).ok();

        let flag = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        let next = if flag("needs_rag") {
            Next::Node("rag_processing".to_string())
        } else if flag("needs_competency") {
            Next::Node("competency_diagnosis".to_string())
        } else if flag("needs_recommendation") {
            Next::Node("recommendation".to_string())
        } else {
            Next::Node("final_synthesis".to_string())
        };
        Ok((state, next))
    }
}

// ---------------------------------------------------------------------------
// rag_processing

pub(crate) struct RagProcessingNode {
    pub shared: Arc<Shared>,
}

/// Quality gate: weak or unsupported answers force a replan.
pub(crate) fn rag_answer_is_weak(state: &OrchestratorState) -> bool {
    let Some(rag) = &state.rag_result else {
        return false;
    };
    let retrieved = state.retrieved_documents.len();
    if retrieved == 0 {
        return true;
    }
    let text = rag.response.trim();
    if text.is_empty() {
        return true;
    }
    let lowered = text.to_lowercase();
    if UNCERTAINTY_MARKERS.iter().any(|m| lowered.contains(m)) {
        return true;
    }
    text.chars().count() < 120 && retrieved >= 2
}

fn determine_post_rag_workflow(
    state: &OrchestratorState,
    message: &str,
) -> Option<WorkflowType> {
    for doc in &state.retrieved_documents {
        match doc.metadata.get("category").and_then(Value::as_str) {
            Some("competency") => return Some(WorkflowType::Competency),
            Some("policy") => return Some(WorkflowType::Analytics),
            Some("education") => return Some(WorkflowType::Recommendation),
            _ => {}
        }
    }
    let lowered = message.to_lowercase();
    if ["역량", "진단"].iter().any(|k| lowered.contains(k)) {
        Some(WorkflowType::Competency)
    } else if ["추천", "학습"].iter().any(|k| lowered.contains(k)) {
        Some(WorkflowType::Recommendation)
    } else if ["분석", "리포트"].iter().any(|k| lowered.contains(k)) {
        Some(WorkflowType::Analytics)
    } else {
        None
    }
}

#[async_trait]
impl Node<OrchestratorState> for RagProcessingNode {
    fn id(&self) -> &str {
        "rag_processing"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let Some(text) = state.latest_user_text().map(String::from) else {
            state.add_error("처리할 메시지가 없습니다");
            return Ok((state, Next::Node("final_synthesis".to_string())));
        };

        let query_type = QueryType::classify(&text);
        let user_context = RagUserContext {
            user_id: state.user_id.clone(),
            session_id: state.session_id.clone(),
            user_tier: context_str(&state, "user_tier").unwrap_or_else(|| "free".to_string()),
            interests: context_strings(&state, "interests"),
            learning_style: context_str(&state, "learning_style")
                .unwrap_or_else(|| "balanced".to_string()),
            filters: state.context.get("filters").cloned(),
            cost_preference: state
                .plan
                .as_ref()
                .map(|p| p.cost_preference.as_str().to_string()),
            extra: state.context.clone(),
        };
        let history: Vec<HistoryTurn> = state.messages[..state.messages.len().saturating_sub(1)]
            .iter()
            .map(|m| HistoryTurn {
                role: if m.is_assistant() {
                    "assistant".to_string()
                } else {
                    "user".to_string()
                },
                content: m.content().to_string(),
            })
            .collect();

        let outcome = self
            .shared
            .rag
            .process_query(&text, query_type, &user_context, &history)
            .await;

        if outcome.success {
            state.retrieved_documents = outcome.retrieved_documents.clone();
            state.rag_context = outcome.context.clone();
            state.add_audit(
                "rag_processing",
                HashMap::from([
                    ("query_type".to_string(), json!(query_type.as_str())),
                    (
                        "retrieved_docs".to_string(),
                        json!(outcome.retrieved_documents.len()),
                    ),
                    (
                        "processing_time_ms".to_string(),
                        json!(outcome.processing_time_ms),
                    ),
                ]),
            );
            state.rag_result = Some(outcome);
            state.current_step = "rag_processed".to_string();
        } else {
            state.add_error(format!(
                "RAG 처리 실패: {}",
                outcome.error.as_deref().unwrap_or("unknown")
            ));
        }

        if rag_answer_is_weak(&state) && state.loop_count < state.max_loops {
            state.loop_count += 1;
            state.add_audit(
                "rag_quality_gate",
                HashMap::from([
                    ("decision".to_string(), json!("replan")),
                    ("loop_count".to_string(), json!(state.loop_count)),
                ]),
            );
            return Ok((state, Next::Node("replan_request".to_string())));
        }

        let next = match determine_post_rag_workflow(&state, &text) {
            Some(workflow) => {
                state.workflow_type = workflow;
                Next::Node(workflow_node(workflow).to_string())
            }
            None => Next::Node("final_synthesis".to_string()),
        };
        Ok((state, next))
    }
}

// ---------------------------------------------------------------------------
// llm_manager

pub(crate) struct LlmManagerNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for LlmManagerNode {
    fn id(&self) -> &str {
        "llm_manager"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let tier = context_str(&state, "user_tier").unwrap_or_else(|| "free".to_string());
        let complexity = state
            .plan
            .as_ref()
            .map(|p| p.complexity.as_str())
            .unwrap_or("medium");
        let cost = state
            .plan
            .as_ref()
            .map(|p| p.cost_preference.as_str())
            .unwrap_or("balanced");
        let choice = route_request(&self.shared.generation, &tier, complexity, "general", cost);

        state.performance_metrics.insert(
            "llm_selection".to_string(),
            json!({
                "selected_model": choice.model_name,
                "cost_hint": choice.cost_hint,
                "latency_hint": choice.latency_hint,
            }),
        );
        state.selected_llm_model = Some(choice.model_name);
        state.current_step = "llm_managed".to_string();
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// competency_diagnosis

pub(crate) struct CompetencyNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for CompetencyNode {
    fn id(&self) -> &str {
        "competency_diagnosis"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let responses: Vec<CompetencyResponse> = state
            .context
            .get("competency_responses")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        if responses.is_empty() {
            state.add_error("역량진단 응답 데이터가 없습니다");
        } else {
            let assessment = self.shared.competency.execute(responses);
            state.competency_data = serde_json::to_value(&assessment).ok();
        }
        state.current_step = "competency_completed".to_string();
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// recommendation

pub(crate) struct RecommendationNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for RecommendationNode {
    fn id(&self) -> &str {
        "recommendation"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let assessment: Option<CompetencyAssessment> = state
            .competency_data
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let interests = context_strings(&state, "interests");
        let data = self
            .shared
            .recommendation
            .execute(assessment.as_ref(), &interests);
        state.recommendation_data = serde_json::to_value(&data).ok();
        state.current_step = "recommendations_generated".to_string();
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// mission_recommendation

pub(crate) struct MissionNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for MissionNode {
    fn id(&self) -> &str {
        "mission_recommendation"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let profile: MissionCandidateProfile = state
            .context
            .get("creator_profile")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let onboarding: OnboardingSummary = state
            .context
            .get("onboarding_result")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let filters: MissionFilters = state
            .context
            .get("filters")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let missions: Vec<Mission> = state
            .context
            .get("missions")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|v| match serde_json::from_value(v.clone()) {
                        Ok(m) => Some(m),
                        Err(e) => {
                            tracing::warn!(error = %e, "invalid mission payload skipped");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        if missions.is_empty() {
            state.add_error("추천할 미션 후보가 없습니다.");
        } else {
            let youtube = state
                .mcp_enrichment
                .as_ref()
                .and_then(|e| e.youtube_insights.clone());
            state.mission_recommendations = self.shared.mission.recommend(
                &profile,
                &onboarding,
                &missions,
                &filters,
                youtube.as_ref(),
            );
        }
        state.current_step = "mission_recommendations_generated".to_string();
        Ok((state, Next::Node("final_synthesis".to_string())))
    }
}

// ---------------------------------------------------------------------------
// vector_search

pub(crate) struct VectorSearchNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for VectorSearchNode {
    fn id(&self) -> &str {
        "vector_search"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let query = state.latest_user_text().map(String::from).unwrap_or_default();
        state.search_results = self.shared.search.execute(&query).await;
        state.current_step = "search_completed".to_string();
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// external_integration

pub(crate) struct ExternalIntegrationNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for ExternalIntegrationNode {
    fn id(&self) -> &str {
        "external_integration"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        state.external_api_results = self.shared.integration.execute(&state.context).await;
        state.current_step = "integration_completed".to_string();

        // Loop-safe RAG re-entry after the search/tool stage.
        let needs_rag = state.plan.as_ref().map(|p| p.needs_rag).unwrap_or(false);
        if needs_rag && state.rag_result.is_none() && state.loop_count < state.max_loops {
            state.loop_count += 1;
            state.workflow_type = WorkflowType::Rag;
            return Ok((state, Next::Node("rag_processing".to_string())));
        }
        Ok((state, Next::Node("final_synthesis".to_string())))
    }
}

// ---------------------------------------------------------------------------
// analytics

pub(crate) struct AnalyticsNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for AnalyticsNode {
    fn id(&self) -> &str {
        "analytics"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let report_type = context_str(&state, "report_type")
            .map(|name| ReportType::from_name(&name))
            .unwrap_or_default();
        let report = self
            .shared
            .analytics
            .execute(report_type, state.user_id.as_deref())
            .await;
        let youtube = state
            .mcp_enrichment
            .as_ref()
            .and_then(|e| e.youtube_insights.clone())
            .unwrap_or(Value::Null);
        state.analytics_results = Some(json!({
            "analysis": report.analysis,
            "metrics": report.metrics,
            "insights": report.insights,
            "recommendations": report.recommendations,
            "youtube_insights": youtube,
        }));
        state.current_step = "analytics_completed".to_string();
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// data_collection

pub(crate) struct DataCollectionNode {
    pub shared: Arc<Shared>,
}

#[async_trait]
impl Node<OrchestratorState> for DataCollectionNode {
    fn id(&self) -> &str {
        "data_collection"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let config: CollectionConfig = state
            .context
            .get("collection_config")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let collected = self.shared.data_collection.execute(&config).await;

        state.performance_metrics.insert(
            "data_collection".to_string(),
            json!({
                "collected_items": collected.success_count,
                "failed_items": collected.error_count,
            }),
        );
        state.add_audit(
            "data_collection",
            HashMap::from([
                ("status".to_string(), json!(collected.status)),
                ("items_collected".to_string(), json!(collected.success_count)),
                ("items_failed".to_string(), json!(collected.error_count)),
            ]),
        );
        state.collected_data = collected.items;
        Ok((state, Next::Continue))
    }
}

// ---------------------------------------------------------------------------
// final_synthesis

pub(crate) struct FinalSynthesisNode {
    pub shared: Arc<Shared>,
}

impl FinalSynthesisNode {
    fn has_domain_outputs(state: &OrchestratorState) -> bool {
        state.competency_data.is_some()
            || state.recommendation_data.is_some()
            || state.analytics_results.is_some()
            || !state.mission_recommendations.is_empty()
            || !state.collected_data.is_empty()
    }

    async fn synthesize(&self, state: &OrchestratorState) -> String {
        // RAG-only runs return the RAG answer verbatim; a still-weak answer
        // after the loop budget gets the frank insufficient-information note.
        if let Some(rag) = &state.rag_result {
            let response = rag.response.trim();
            if !response.is_empty() && !Self::has_domain_outputs(state) {
                if rag_answer_is_weak(state) {
                    return format!(
                        "{response}\n\n충분한 근거 자료를 찾지 못했습니다. 질문을 조금 더 구체적으로 다시 시도해주세요."
                    );
                }
                return response.to_string();
            }
        }

        let user_text = state.latest_user_text().unwrap_or_default();
        if self.shared.generation.has_models() {
            let payload = json!({
                "routing": state.routing,
                "plan": state.plan,
                "competency": state.competency_data,
                "recommendation": state.recommendation_data,
                "missions": state.mission_recommendations.iter().take(5).collect::<Vec<_>>(),
                "analytics": state.analytics_results,
                "search_results_count": state.search_results.len(),
                "external_api_results": state.external_api_results,
                "data_collection_count": state.collected_data.len(),
                "rag": {
                    "retrieved_docs_count": state.retrieved_documents.len(),
                    "answer": state.rag_result.as_ref().map(|r| r.response.clone()),
                },
            });
            let opts = GenerateOptions {
                system_prompt: Some(
                    "You are the Final Synthesizer for a compound AI system.\n\
                     Write the final user-facing answer in Korean.\n\
                     Rules:\n\
                     - Use the provided results; do not fabricate.\n\
                     - If a RAG answer exists, incorporate it.\n\
                     - If some parts are missing, say what is missing and what to do next.\n\
                     - Keep it structured with clear headings and bullet points."
                        .to_string(),
                ),
                model_name: state.selected_llm_model.clone(),
                ..Default::default()
            };
            let prompt = format!(
                "User request:\n{user_text}\n\nSystem outputs(JSON):\n{}",
                serde_json::to_string(&payload).unwrap_or_default()
            );
            match self.shared.generation.try_generate(&prompt, &opts).await {
                Ok(response) => return response,
                Err(e) => tracing::warn!(error = %e, "final synthesis llm failed, concatenating"),
            }
        }

        // Deterministic fallback: concatenate the non-empty outputs.
        let mut parts: Vec<String> = Vec::new();
        if let Some(rag) = &state.rag_result {
            if !rag.response.trim().is_empty() {
                parts.push(rag.response.clone());
            }
        }
        if let Some(c) = &state.competency_data {
            parts.push(format!("역량진단 분석: {c}"));
        }
        if let Some(r) = &state.recommendation_data {
            parts.push(format!("맞춤형 추천: {r}"));
        }
        if let Some(a) = &state.analytics_results {
            parts.push(format!("분석 리포트: {a}"));
        }
        if !state.mission_recommendations.is_empty() {
            parts.push(format!(
                "미션 추천: {}개",
                state.mission_recommendations.len()
            ));
        }
        if let Some(model) = &state.selected_llm_model {
            parts.push(format!("사용된 LLM: {model}"));
        }
        if parts.is_empty() {
            "처리가 완료되었습니다.".to_string()
        } else {
            parts.join("\n\n")
        }
    }
}

#[async_trait]
impl Node<OrchestratorState> for FinalSynthesisNode {
    fn id(&self) -> &str {
        "final_synthesis"
    }

    async fn run(
        &self,
        mut state: OrchestratorState,
    ) -> Result<(OrchestratorState, Next), AgentError> {
        let response = self.synthesize(&state).await;
        state.messages.push(crate::message::Message::Assistant(response));

        if let Some(first) = state.audit_trail.first() {
            if let Ok(start) = chrono::DateTime::parse_from_rfc3339(&first.timestamp) {
                let elapsed_ms =
                    (chrono::Utc::now() - start.with_timezone(&chrono::Utc)).num_milliseconds();
                state.performance_metrics.insert(
                    "total_execution_time_ms".to_string(),
                    json!(elapsed_ms.max(0)),
                );
            }
        }

        state.current_step = "completed".to_string();
        let total_steps = state.audit_trail.len();
        state.add_audit(
            "final_synthesis",
            HashMap::from([
                ("status".to_string(), json!("completed")),
                ("total_steps".to_string(), json!(total_steps)),
            ]),
        );
        Ok((state, Next::End))
    }
}
