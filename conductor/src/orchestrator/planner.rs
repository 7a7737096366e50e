//! Deliberative planner and replanner.
//!
//! Both emit a machine-readable plan and never answer the user. Parse
//! failures produce the minimal safe plan so the graph always has something
//! to act on.

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{GenerateOptions, GenerationEngine};

use super::router::strip_code_fences;
use super::state::{Complexity, CostPreference, Plan, WorkflowType};

/// Message traits that force planning even on a confident route.
pub const COMPLEXITY_KEYWORDS: &[&str] =
    &["설계", "아키텍처", "구현", "리팩터링", "최적", "전략", "완성해줘"];

const PLAN_SCHEMA: &str = r#"Output schema:
{
  "workflow_type": "general|rag|competency|recommendation|mission|search|analytics|data_collection|deep_agents",
  "needs_rag": boolean,
  "needs_tools": boolean,
  "complexity": "simple|medium|high",
  "cost_preference": "budget|balanced|performance|speed",
  "notes": "short string"
}"#;

#[derive(Debug, Deserialize)]
struct PlanWire {
    #[serde(default)]
    workflow_type: String,
    #[serde(default)]
    needs_rag: bool,
    #[serde(default)]
    needs_tools: bool,
    #[serde(default)]
    complexity: String,
    #[serde(default)]
    cost_preference: String,
    #[serde(default)]
    notes: String,
}

fn parse_plan(text: &str, fallback_workflow: WorkflowType) -> Option<Plan> {
    let cleaned = strip_code_fences(text);
    let wire: PlanWire = serde_json::from_str(&cleaned).ok()?;
    Some(Plan {
        workflow_type: WorkflowType::from_name(&wire.workflow_type).unwrap_or(fallback_workflow),
        needs_rag: wire.needs_rag,
        needs_tools: wire.needs_tools,
        complexity: match wire.complexity.as_str() {
            "simple" => Complexity::Simple,
            "high" => Complexity::High,
            _ => Complexity::Medium,
        },
        cost_preference: match wire.cost_preference.as_str() {
            "budget" => CostPreference::Budget,
            "performance" => CostPreference::Performance,
            "speed" => CostPreference::Speed,
            _ => CostPreference::Balanced,
        },
        notes: wire.notes,
    })
}

/// Whether the planner should run at all for this message. Each disjunct is
/// independent: low routing confidence, general/rag workflow, long message,
/// or complexity keywords.
pub fn should_plan(workflow: WorkflowType, routing_confidence: f64, message: &str) -> bool {
    if matches!(workflow, WorkflowType::General | WorkflowType::Rag) {
        return true;
    }
    if routing_confidence < 0.65 {
        return true;
    }
    if message.chars().count() > 200 {
        return true;
    }
    COMPLEXITY_KEYWORDS.iter().any(|k| message.contains(k))
}

/// Deep-model planner (temperature 0 clients; JSON-only contract).
pub struct Planner {
    engine: Arc<GenerationEngine>,
}

impl Planner {
    pub fn new(engine: Arc<GenerationEngine>) -> Self {
        Self { engine }
    }

    fn minimal_plan(workflow: WorkflowType, message: &str, notes: &str) -> Plan {
        Plan {
            workflow_type: workflow,
            needs_rag: workflow == WorkflowType::Rag,
            needs_tools: matches!(
                workflow,
                WorkflowType::DataCollection | WorkflowType::Mission
            ),
            complexity: if message.chars().count() > 200 {
                Complexity::High
            } else {
                Complexity::Medium
            },
            cost_preference: CostPreference::Balanced,
            notes: notes.to_string(),
        }
    }

    /// Produces the initial plan.
    pub async fn plan(
        &self,
        message: &str,
        workflow: WorkflowType,
        routing_confidence: f64,
    ) -> Plan {
        let system_prompt = format!(
            "You are a System-2 Planner for an agentic, compound AI system.\n\
             Create a concise execution plan ONLY in JSON (no markdown, no prose).\n\n\
             {PLAN_SCHEMA}\n\
             Rules:\n\
             - Do NOT answer the user. Only produce the plan JSON.\n\
             - Prefer low cost: routing/summary uses fast models; planning only when needed."
        );
        let opts = GenerateOptions {
            system_prompt: Some(system_prompt),
            model_name: Some(self.engine.deep_model().to_string()),
            ..Default::default()
        };
        let prompt = format!(
            "User request:\n{message}\n\nCurrent route: {}\nRouter confidence: {routing_confidence}",
            workflow.as_str()
        );
        match self.engine.try_generate(&prompt, &opts).await {
            Ok(response) => parse_plan(&response, workflow)
                .unwrap_or_else(|| Self::minimal_plan(workflow, message, "planner_parse_failed")),
            Err(e) => {
                tracing::warn!(error = %e, "planner call failed");
                Self::minimal_plan(workflow, message, "planner_parse_failed")
            }
        }
    }

    /// Produces a corrective plan after tool failure or a weak RAG answer.
    /// Policy hardening is applied by the caller (search → needs_rag, clear
    /// stale RAG output).
    pub async fn replan(
        &self,
        message: &str,
        workflow: WorkflowType,
        routing_summary: &str,
        prev_plan: Option<&Plan>,
        rag_docs_count: usize,
        rag_answer_preview: &str,
        tool_state_summary: &str,
    ) -> Plan {
        let system_prompt = format!(
            "You are a System-2 Planner for an agentic, compound AI system.\n\
             You MUST update the plan based on tool execution constraints.\n\n\
             Output JSON only (no markdown, no prose).\n\n\
             {PLAN_SCHEMA}\n\
             Rules:\n\
             - If tools are failing/unavailable, set needs_tools=false and prefer needs_rag=true \
             if knowledge/context is needed.\n\
             - If the RAG answer is weak/uncertain, prefer workflow_type=\"search\" or \"rag\" \
             with needs_rag=true, or enable needs_tools=true only if cost is justified.\n\
             - Do NOT answer the user. Only produce the plan JSON."
        );
        let prev_plan_text = prev_plan
            .and_then(|p| serde_json::to_string(p).ok())
            .unwrap_or_else(|| "null".to_string());
        let prompt = format!(
            "User request:\n{message}\n\nRouter:\n{routing_summary}\n\nPrevious plan:\n{prev_plan_text}\n\n\
             RAG status:\nretrieved_docs_count={rag_docs_count}\nrag_answer_preview:\n{rag_answer_preview}\n\n\
             Tool enrichment result:\n{tool_state_summary}"
        );
        let opts = GenerateOptions {
            system_prompt: Some(system_prompt),
            model_name: Some(self.engine.deep_model().to_string()),
            ..Default::default()
        };
        match self.engine.try_generate(&prompt, &opts).await {
            Ok(response) => parse_plan(&response, workflow)
                .unwrap_or_else(|| Self::replan_fallback(prev_plan, workflow)),
            Err(e) => {
                tracing::warn!(error = %e, "replanner call failed");
                Self::replan_fallback(prev_plan, workflow)
            }
        }
    }

    /// Minimal safety on replanner parse failure: tools off, RAG on.
    fn replan_fallback(prev_plan: Option<&Plan>, workflow: WorkflowType) -> Plan {
        match prev_plan {
            Some(prev) => {
                let mut plan = prev.clone();
                plan.needs_tools = false;
                plan.needs_rag = true;
                plan.notes = "replan_parse_failed".to_string();
                plan
            }
            None => Plan {
                workflow_type: if workflow == WorkflowType::General {
                    WorkflowType::Rag
                } else {
                    workflow
                },
                needs_rag: true,
                needs_tools: false,
                complexity: Complexity::Medium,
                cost_preference: CostPreference::Balanced,
                notes: "replan_fallback".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::llm::MockLlm;

    fn planner(responses: Vec<String>) -> Planner {
        let mut engine = GenerationEngine::from_settings(&Settings::default());
        engine.register_model(Arc::new(MockLlm::new("gpt-5.1", responses)));
        Planner::new(Arc::new(engine))
    }

    /// **Scenario**: each planner trigger disjunct fires independently.
    #[test]
    fn trigger_disjuncts() {
        // Low confidence alone.
        assert!(should_plan(WorkflowType::Mission, 0.5, "짧은 요청"));
        // General workflow alone.
        assert!(should_plan(WorkflowType::General, 0.99, "짧은 요청"));
        // Rag workflow alone.
        assert!(should_plan(WorkflowType::Rag, 0.99, "짧은 요청"));
        // Long message alone.
        let long = "요".repeat(201);
        assert!(should_plan(WorkflowType::Mission, 0.99, &long));
        // Complexity keyword alone.
        assert!(should_plan(WorkflowType::Mission, 0.99, "아키텍처 검토"));
        // None of the above: skip.
        assert!(!should_plan(WorkflowType::Mission, 0.99, "짧은 요청"));
    }

    /// **Scenario**: well-formed JSON becomes a typed plan and may override
    /// the workflow.
    #[tokio::test]
    async fn parses_plan_json() {
        let p = planner(vec![
            "{\"workflow_type\": \"search\", \"needs_rag\": true, \"needs_tools\": false, \
             \"complexity\": \"high\", \"cost_preference\": \"speed\", \"notes\": \"ok\"}"
                .into(),
        ]);
        let plan = p.plan("검색해줘", WorkflowType::General, 0.4).await;
        assert_eq!(plan.workflow_type, WorkflowType::Search);
        assert!(plan.needs_rag);
        assert_eq!(plan.complexity, Complexity::High);
        assert_eq!(plan.cost_preference, CostPreference::Speed);
    }

    /// **Scenario**: parse failure emits the minimal safe plan preserving
    /// the current workflow and flagging the notes.
    #[tokio::test]
    async fn parse_failure_minimal_plan() {
        let p = planner(vec!["JSON 아님".into()]);
        let plan = p.plan("미션 추천", WorkflowType::Mission, 0.4).await;
        assert_eq!(plan.workflow_type, WorkflowType::Mission);
        assert_eq!(plan.notes, "planner_parse_failed");
        assert!(plan.needs_tools);
        assert!(!plan.needs_rag);
    }

    /// **Scenario**: replanner parse failure forces tools off and RAG on.
    #[tokio::test]
    async fn replan_parse_failure_flips_to_rag() {
        let p = planner(vec!["역시 JSON 아님".into()]);
        let prev = Plan {
            workflow_type: WorkflowType::Mission,
            needs_rag: false,
            needs_tools: true,
            complexity: Complexity::Medium,
            cost_preference: CostPreference::Balanced,
            notes: String::new(),
        };
        let plan = p
            .replan("미션 추천", WorkflowType::Mission, "{}", Some(&prev), 0, "", "{}")
            .await;
        assert!(!plan.needs_tools);
        assert!(plan.needs_rag);
        assert_eq!(plan.notes, "replan_parse_failed");
    }
}
