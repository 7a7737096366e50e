//! Orchestrator state: the durable value checkpointed per session.
//!
//! A shared envelope (messages, routing, plan, loop budget, audit, errors)
//! plus one dedicated output field per workflow. Nodes mutate only their own
//! output field and the envelope bookkeeping; everything else passes through
//! untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::MissionAssignment;
use crate::mcp::{Enrichment, ToolExecutionRecord};
use crate::message::Message;
use crate::rag::RagOutcome;
use crate::retrieval::RetrievedDocument;

/// Workflow selected by routing/planning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    #[default]
    General,
    Rag,
    Competency,
    Recommendation,
    Mission,
    Search,
    Analytics,
    DataCollection,
    DeepAgents,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::General => "general",
            WorkflowType::Rag => "rag",
            WorkflowType::Competency => "competency",
            WorkflowType::Recommendation => "recommendation",
            WorkflowType::Mission => "mission",
            WorkflowType::Search => "search",
            WorkflowType::Analytics => "analytics",
            WorkflowType::DataCollection => "data_collection",
            WorkflowType::DeepAgents => "deep_agents",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "general" => Some(WorkflowType::General),
            "rag" => Some(WorkflowType::Rag),
            "competency" => Some(WorkflowType::Competency),
            "recommendation" => Some(WorkflowType::Recommendation),
            "mission" => Some(WorkflowType::Mission),
            "search" => Some(WorkflowType::Search),
            "analytics" => Some(WorkflowType::Analytics),
            "data_collection" => Some(WorkflowType::DataCollection),
            "deep_agents" => Some(WorkflowType::DeepAgents),
            _ => None,
        }
    }
}

/// Request security posture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    #[default]
    Standard,
    High,
}

/// Plan complexity hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

/// Planner cost preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPreference {
    Budget,
    #[default]
    Balanced,
    Performance,
    Speed,
}

impl CostPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostPreference::Budget => "budget",
            CostPreference::Balanced => "balanced",
            CostPreference::Performance => "performance",
            CostPreference::Speed => "speed",
        }
    }
}

/// Router output.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Routing {
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Planner output; replaced only by a replan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub workflow_type: WorkflowType,
    pub needs_rag: bool,
    pub needs_tools: bool,
    pub complexity: Complexity,
    pub cost_preference: CostPreference,
    pub notes: String,
}

/// Audit record of the last tool-enrichment attempt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolEnrichmentOutcome {
    pub ran: bool,
    /// not_needed | no_spec_or_service | error | ok
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_key: Option<String>,
    #[serde(default)]
    pub needs_tools: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_preference: Option<String>,
    #[serde(default)]
    pub enriched_keys: Vec<String>,
    #[serde(default)]
    pub tool_policy: HashMap<String, ToolExecutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Audit record of the last replan attempt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReplanOutcome {
    pub ran: bool,
    #[serde(default)]
    pub loop_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// One append-only audit entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub step: String,
    pub timestamp: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

/// The durable orchestrator state, checkpointed after every node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrchestratorState {
    // Shared envelope.
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub workflow_type: WorkflowType,
    #[serde(default)]
    pub routing: Routing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub loop_count: u32,
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
    #[serde(default)]
    pub tool_enrichment_result: ToolEnrichmentOutcome,
    #[serde(default)]
    pub replan_result: ReplanOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_enrichment: Option<Enrichment>,
    #[serde(default)]
    pub use_deep_agents: bool,

    // Per-workflow outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_result: Option<RagOutcome>,
    #[serde(default)]
    pub retrieved_documents: Vec<RetrievedDocument>,
    #[serde(default)]
    pub rag_context: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competency_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_data: Option<Value>,
    #[serde(default)]
    pub mission_recommendations: Vec<MissionAssignment>,
    #[serde(default)]
    pub search_results: Vec<RetrievedDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_results: Option<Value>,
    #[serde(default)]
    pub external_api_results: HashMap<String, Value>,
    #[serde(default)]
    pub collected_data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_agents_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_llm_model: Option<String>,

    // Observability.
    #[serde(default)]
    pub performance_metrics: HashMap<String, Value>,
    #[serde(default)]
    pub audit_trail: Vec<AuditRecord>,
    #[serde(default)]
    pub errors: Vec<String>,
}

fn default_max_loops() -> u32 {
    2
}

impl OrchestratorState {
    pub fn new(
        message: &str,
        user_id: Option<String>,
        session_id: Option<String>,
        context: HashMap<String, Value>,
        security_level: SecurityLevel,
        max_loops: u32,
    ) -> Self {
        Self {
            messages: vec![Message::User(message.to_string())],
            user_id,
            session_id,
            context,
            security_level,
            current_step: "init".to_string(),
            max_loops,
            ..Default::default()
        }
    }

    /// Latest user-authored message text.
    pub fn latest_user_text(&self) -> Option<&str> {
        crate::message::latest_user_text(&self.messages)
    }

    /// Appends an error. Nodes that fail record here and leave everything
    /// else untouched.
    pub fn add_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        tracing::error!(%error, "orchestrator error recorded");
        self.errors.push(error);
    }

    /// Appends an audit record with the current timestamp.
    pub fn add_audit(&mut self, step: &str, fields: HashMap<String, Value>) {
        self.audit_trail.push(AuditRecord {
            step: step.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            fields,
        });
    }

    /// Clears RAG outputs so the RAG stage re-enters after a replan.
    pub fn clear_rag_outputs(&mut self) {
        self.rag_result = None;
        self.retrieved_documents.clear();
        self.rag_context.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: the state round-trips through JSON exactly (the
    /// checkpoint wire contract).
    #[test]
    fn state_round_trips_through_json() {
        let mut state = OrchestratorState::new(
            "안녕하세요",
            Some("u1".into()),
            Some("s1".into()),
            HashMap::new(),
            SecurityLevel::Standard,
            2,
        );
        state.workflow_type = WorkflowType::Mission;
        state.loop_count = 1;
        state.add_audit("route_request", HashMap::new());
        state.add_error("테스트 오류");

        let json = serde_json::to_string(&state).unwrap();
        let back: OrchestratorState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.messages, state.messages);
        assert_eq!(back.workflow_type, WorkflowType::Mission);
        assert_eq!(back.loop_count, 1);
        assert_eq!(back.max_loops, 2);
        assert_eq!(back.errors, state.errors);
        assert_eq!(back.audit_trail.len(), 1);
    }

    /// **Scenario**: workflow names round-trip through from_name/as_str.
    #[test]
    fn workflow_names_round_trip() {
        for wf in [
            WorkflowType::General,
            WorkflowType::Rag,
            WorkflowType::Competency,
            WorkflowType::Recommendation,
            WorkflowType::Mission,
            WorkflowType::Search,
            WorkflowType::Analytics,
            WorkflowType::DataCollection,
            WorkflowType::DeepAgents,
        ] {
            assert_eq!(WorkflowType::from_name(wf.as_str()), Some(wf));
        }
        assert_eq!(WorkflowType::from_name("unknown"), None);
    }

    #[test]
    fn clear_rag_outputs_resets_fields() {
        let mut state = OrchestratorState::default();
        state.rag_result = Some(Default::default());
        state.retrieved_documents = vec![];
        state.rag_context.insert("k".into(), Value::Null);
        state.clear_rag_outputs();
        assert!(state.rag_result.is_none());
        assert!(state.rag_context.is_empty());
    }
}
