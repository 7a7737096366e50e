//! Main orchestrator: the compiled state machine plus the session API.
//!
//! route → plan → tool_enrichment → { replan | domain | rag | deep } →
//! final_synthesis, checkpointed per session. No exception escapes a run;
//! every failure lands in `state.errors` and the synthesizer still answers.

pub mod nodes;
pub mod planner;
pub mod router;
pub mod state;

pub use planner::{should_plan, Planner, COMPLEXITY_KEYWORDS};
pub use router::{should_use_rag, IntentAnalyzer, IntentResult, RAG_INDICATORS};
pub use state::{
    AuditRecord, Complexity, CostPreference, OrchestratorState, Plan, ReplanOutcome, Routing,
    SecurityLevel, ToolEnrichmentOutcome, WorkflowType,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::{
    AnalyticsAgent, CompetencyAgent, DataCollectionAgent, DeepAgents, IntegrationAgent,
    MissionAgent, MissionAssignment, RecommendationAgent, SearchAgent,
};
use crate::config::Settings;
use crate::graph::{CompilationError, CompiledStateGraph, RunConfig, StateGraph, END, START};
use crate::llm::GenerationEngine;
use crate::mcp::McpIntegrationService;
use crate::memory::Checkpointer;
use crate::message::Message;
use crate::metrics::metrics_collector;
use crate::rag::RagPipeline;
use crate::retrieval::RetrievalEngine;

use nodes::{
    AnalyticsNode, CompetencyNode, DataCollectionNode, DeepAgentsNode, ExternalIntegrationNode,
    FinalSynthesisNode, LlmManagerNode, MissionNode, PlanRequestNode, RagProcessingNode,
    RecommendationNode, ReplanRequestNode, RouteRequestNode, Shared, ToolEnrichmentNode,
    VectorSearchNode,
};

/// One orchestrator request.
#[derive(Clone, Debug, Deserialize)]
pub struct OrchestratorRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub security_level: SecurityLevel,
}

impl OrchestratorRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: None,
            session_id: None,
            context: HashMap::new(),
            security_level: SecurityLevel::Standard,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }
}

/// Response envelope returned to handlers.
#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorResponse {
    pub success: bool,
    pub response: Option<String>,
    pub workflow_type: WorkflowType,
    pub performance_metrics: HashMap<String, Value>,
    pub audit_trail: Vec<AuditRecord>,
    pub errors: Vec<String>,
    pub thread_id: String,
    pub state_saved: bool,
    pub mission_recommendations: Vec<MissionAssignment>,
    pub resumed: bool,
}

/// Summary of a stored session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub state_exists: bool,
    pub current_step: String,
    pub workflow_type: WorkflowType,
    pub messages_count: usize,
    pub audit_trail_count: usize,
    pub errors_count: usize,
}

/// The main orchestrator.
pub struct Orchestrator {
    graph: CompiledStateGraph<OrchestratorState>,
    checkpointer: Arc<dyn Checkpointer<OrchestratorState>>,
    max_loops: u32,
}

impl Orchestrator {
    /// Wires the graph from pre-built engines. The checkpointer is shared by
    /// the graph (per-node writes) and the session API (reads/deletes).
    pub fn new(
        settings: &Settings,
        generation: Arc<GenerationEngine>,
        retrieval: Arc<RetrievalEngine>,
        mcp: Arc<McpIntegrationService>,
        checkpointer: Arc<dyn Checkpointer<OrchestratorState>>,
    ) -> Result<Self, CompilationError> {
        let rag = Arc::new(RagPipeline::new(
            settings,
            retrieval.clone(),
            generation.clone(),
        ));
        let shared = Arc::new(Shared {
            generation: generation.clone(),
            rag,
            mcp: mcp.clone(),
            intent: IntentAnalyzer::new(generation.clone()),
            planner: Planner::new(generation.clone()),
            deep: DeepAgents::new(generation.clone(), settings.deep_agents.clone()),
            mission: MissionAgent::default(),
            analytics: AnalyticsAgent::with_sample_data(),
            competency: CompetencyAgent::new(),
            recommendation: RecommendationAgent::new(),
            search: SearchAgent::new(retrieval),
            integration: IntegrationAgent::new(mcp.clone()),
            data_collection: DataCollectionAgent::new(mcp),
        });

        let graph = Self::build_graph(shared, checkpointer.clone())?;
        Ok(Self {
            graph,
            checkpointer,
            max_loops: settings.max_loops,
        })
    }

    fn build_graph(
        shared: Arc<Shared>,
        checkpointer: Arc<dyn Checkpointer<OrchestratorState>>,
    ) -> Result<CompiledStateGraph<OrchestratorState>, CompilationError> {
        let mut graph = StateGraph::<OrchestratorState>::new();
        graph.add_node("route_request", Arc::new(RouteRequestNode { shared: shared.clone() }));
        graph.add_node("plan_request", Arc::new(PlanRequestNode { shared: shared.clone() }));
        graph.add_node(
            "tool_enrichment",
            Arc::new(ToolEnrichmentNode { shared: shared.clone() }),
        );
        graph.add_node(
            "replan_request",
            Arc::new(ReplanRequestNode { shared: shared.clone() }),
        );
        graph.add_node(
            "deep_agents_processing",
            Arc::new(DeepAgentsNode { shared: shared.clone() }),
        );
        graph.add_node(
            "rag_processing",
            Arc::new(RagProcessingNode { shared: shared.clone() }),
        );
        graph.add_node("llm_manager", Arc::new(LlmManagerNode { shared: shared.clone() }));
        graph.add_node(
            "competency_diagnosis",
            Arc::new(CompetencyNode { shared: shared.clone() }),
        );
        graph.add_node(
            "recommendation",
            Arc::new(RecommendationNode { shared: shared.clone() }),
        );
        graph.add_node(
            "mission_recommendation",
            Arc::new(MissionNode { shared: shared.clone() }),
        );
        graph.add_node(
            "vector_search",
            Arc::new(VectorSearchNode { shared: shared.clone() }),
        );
        graph.add_node(
            "external_integration",
            Arc::new(ExternalIntegrationNode { shared: shared.clone() }),
        );
        graph.add_node("analytics", Arc::new(AnalyticsNode { shared: shared.clone() }));
        graph.add_node(
            "data_collection",
            Arc::new(DataCollectionNode { shared: shared.clone() }),
        );
        graph.add_node("final_synthesis", Arc::new(FinalSynthesisNode { shared }));

        graph.add_edge(START, "route_request");
        graph.add_edge("route_request", "plan_request");
        graph.add_edge("plan_request", "tool_enrichment");
        // tool_enrichment routes itself (replan or workflow entry).
        graph.add_edge("replan_request", "tool_enrichment");
        // rag_processing, deep_agents_processing and external_integration
        // route themselves; the rest form fixed chains.
        graph.add_edge("competency_diagnosis", "recommendation");
        graph.add_edge("recommendation", "final_synthesis");
        graph.add_edge("vector_search", "external_integration");
        graph.add_edge("analytics", "final_synthesis");
        graph.add_edge("data_collection", "final_synthesis");
        graph.add_edge("llm_manager", "final_synthesis");
        graph.add_edge("final_synthesis", END);

        graph.compile_with_checkpointer(checkpointer)
    }

    fn response_from_state(
        state: &OrchestratorState,
        thread_id: String,
        state_saved: bool,
        resumed: bool,
    ) -> OrchestratorResponse {
        let response = state
            .messages
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .map(|m| m.content().to_string());
        OrchestratorResponse {
            success: true,
            response,
            workflow_type: state.workflow_type,
            performance_metrics: state.performance_metrics.clone(),
            audit_trail: state.audit_trail.clone(),
            errors: state.errors.clone(),
            thread_id,
            state_saved,
            mission_recommendations: state.mission_recommendations.clone(),
            resumed,
        }
    }

    fn failure_response(thread_id: String, error: String) -> OrchestratorResponse {
        OrchestratorResponse {
            success: false,
            response: None,
            workflow_type: WorkflowType::General,
            performance_metrics: HashMap::new(),
            audit_trail: Vec::new(),
            errors: vec![error],
            thread_id,
            state_saved: false,
            mission_recommendations: Vec::new(),
            resumed: false,
        }
    }

    /// Runs one request through the graph under a checkpointed thread.
    pub async fn run(&self, request: OrchestratorRequest) -> OrchestratorResponse {
        let thread_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4()));
        let state = OrchestratorState::new(
            &request.message,
            request.user_id,
            Some(thread_id.clone()),
            request.context,
            request.security_level,
            self.max_loops,
        );
        self.invoke_and_respond(state, thread_id, false).await
    }

    /// Appends a user message to a stored session and re-invokes the graph.
    pub async fn resume_session(
        &self,
        session_id: &str,
        new_message: &str,
    ) -> OrchestratorResponse {
        let stored = match self.checkpointer.get(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                return Self::failure_response(session_id.to_string(), "Session not found".into())
            }
            Err(e) => return Self::failure_response(session_id.to_string(), e.to_string()),
        };

        let mut state = stored;
        state.messages.push(Message::User(new_message.to_string()));
        state.session_id = Some(session_id.to_string());
        // Routing artifacts belong to the previous turn; outputs carry over.
        state.current_step = "init".to_string();
        state.routing = Routing::default();
        state.plan = None;
        state.loop_count = 0;
        state.tool_enrichment_result = ToolEnrichmentOutcome::default();
        state.replan_result = ReplanOutcome::default();

        self.invoke_and_respond(state, session_id.to_string(), true)
            .await
    }

    async fn invoke_and_respond(
        &self,
        state: OrchestratorState,
        thread_id: String,
        resumed: bool,
    ) -> OrchestratorResponse {
        let started = Instant::now();
        let config = RunConfig::with_thread(thread_id.clone());
        let result = self.graph.invoke(state, &config).await;
        metrics_collector().record_operation(
            "orchestrator_run",
            started.elapsed().as_millis() as f64,
            result.is_ok(),
        );

        match result {
            Ok(final_state) => {
                let state_saved = matches!(self.checkpointer.get(&thread_id).await, Ok(Some(_)));
                Self::response_from_state(&final_state, thread_id, state_saved, resumed)
            }
            Err(e) => {
                tracing::error!(error = %e, "orchestrator run failed");
                Self::failure_response(thread_id, e.to_string())
            }
        }
    }

    /// Summary of a stored session, if any.
    pub async fn get_session_state(&self, session_id: &str) -> Option<SessionSummary> {
        match self.checkpointer.get(session_id).await {
            Ok(Some(state)) => Some(SessionSummary {
                session_id: session_id.to_string(),
                state_exists: true,
                current_step: state.current_step.clone(),
                workflow_type: state.workflow_type,
                messages_count: state.messages.len(),
                audit_trail_count: state.audit_trail.len(),
                errors_count: state.errors.len(),
            }),
            Ok(None) => Some(SessionSummary {
                session_id: session_id.to_string(),
                state_exists: false,
                current_step: String::new(),
                workflow_type: WorkflowType::General,
                messages_count: 0,
                audit_trail_count: 0,
                errors_count: 0,
            }),
            Err(e) => {
                tracing::error!(error = %e, "failed to read session state");
                None
            }
        }
    }

    /// Deletes every stored row for the session.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        match self.checkpointer.delete(session_id).await {
            Ok(()) => {
                tracing::info!(session_id, "session cleared");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to clear session");
                false
            }
        }
    }
}
