//! End-to-end orchestrator flows over mock models and in-memory stores.

use std::collections::HashMap;
use std::sync::Arc;

use conductor::breaker::CircuitBreakerManager;
use conductor::config::Settings;
use conductor::llm::{GenerationEngine, MockLlm};
use conductor::mcp::McpIntegrationService;
use conductor::memory::{Checkpointer, MemorySaver};
use conductor::orchestrator::{
    Orchestrator, OrchestratorRequest, OrchestratorState, WorkflowType,
};
use conductor::retrieval::{DocumentInput, HashEmbedder, RetrievalEngine};

struct Harness {
    orchestrator: Orchestrator,
    saver: Arc<MemorySaver<OrchestratorState>>,
    breakers: Arc<CircuitBreakerManager>,
    retrieval: Arc<RetrievalEngine>,
}

fn build_harness(fast_responses: Vec<String>, deep_responses: Vec<String>) -> Harness {
    let settings = Settings::default();
    let retrieval = Arc::new(RetrievalEngine::new(
        settings.retrieval.clone(),
        Arc::new(HashEmbedder),
    ));
    let mut engine = GenerationEngine::from_settings(&settings);
    engine.register_model(Arc::new(MockLlm::new("gemini-2.0-flash", fast_responses)));
    engine.register_model(Arc::new(MockLlm::new("gpt-5.1", deep_responses)));
    let generation = Arc::new(engine);

    let breakers = Arc::new(CircuitBreakerManager::new());
    let mcp = Arc::new(
        McpIntegrationService::from_settings(&settings).with_breaker_manager(breakers.clone()),
    );
    let saver: Arc<MemorySaver<OrchestratorState>> = Arc::new(MemorySaver::new());
    let orchestrator = Orchestrator::new(
        &settings,
        generation,
        retrieval.clone(),
        mcp,
        saver.clone(),
    )
    .expect("static graph wiring compiles");
    Harness {
        orchestrator,
        saver,
        breakers,
        retrieval,
    }
}

async fn seed_corpus(harness: &Harness) {
    let metadata = HashMap::from([
        (
            "source".to_string(),
            serde_json::json!("온보딩 정책 문서"),
        ),
        ("date".to_string(), serde_json::json!("2025-01-15")),
    ]);
    harness
        .retrieval
        .add_documents(vec![DocumentInput {
            id: "policy-grades".to_string(),
            content: "크리에이터 온보딩 등급 정책: 등급은 S, A, B, C 네 단계로 운영되며 \
                      평가 점수에 따라 결정됩니다."
                .to_string(),
            metadata,
        }])
        .await
        .expect("seeding the in-memory corpus succeeds");
}

fn plan_json(workflow: &str, needs_rag: bool, needs_tools: bool) -> String {
    format!(
        "{{\"workflow_type\": \"{workflow}\", \"needs_rag\": {needs_rag}, \
         \"needs_tools\": {needs_tools}, \"complexity\": \"medium\", \
         \"cost_preference\": \"balanced\", \"notes\": \"test\"}}"
    )
}

/// Scenario: session resume. Run with session "s1", then resume with a
/// follow-up; the stored state holds both user messages in order.
#[tokio::test]
async fn session_resume_preserves_message_order() {
    let harness = build_harness(
        vec!["{\"intent\": \"general_chat\", \"confidence\": 0.9}".to_string(); 8],
        vec![plan_json("general", false, false); 8],
    );

    let first = harness
        .orchestrator
        .run(OrchestratorRequest::new("hello").with_session("s1"))
        .await;
    assert!(first.success);
    assert_eq!(first.thread_id, "s1");
    assert!(first.state_saved);
    assert!(first.response.is_some());

    let resumed = harness.orchestrator.resume_session("s1", "follow up").await;
    assert!(resumed.success);
    assert!(resumed.resumed);

    let stored = harness
        .saver
        .get("s1")
        .await
        .expect("checkpoint read works")
        .expect("state exists for s1");
    let user_texts: Vec<&str> = stored
        .messages
        .iter()
        .filter(|m| m.is_user())
        .map(|m| m.content())
        .collect();
    assert_eq!(user_texts, vec!["hello", "follow up"]);
    assert!(stored.messages.len() >= 2);

    let summary = harness
        .orchestrator
        .get_session_state("s1")
        .await
        .expect("summary available");
    assert!(summary.state_exists);
    assert!(summary.messages_count >= 2);
}

/// Scenario: resuming a missing session fails without synthesizing state.
#[tokio::test]
async fn resume_unknown_session_fails() {
    let harness = build_harness(vec![], vec![]);
    let response = harness.orchestrator.resume_session("ghost", "hi").await;
    assert!(!response.success);
    assert!(response.errors.iter().any(|e| e.contains("not found")));
}

/// Scenario: tool failure → replan → RAG. The web breaker is open, the plan
/// demands tools, and after one corrective loop the run lands on a RAG
/// answer with needs_tools=false, needs_rag=true, loop_count=1.
#[tokio::test]
async fn tool_failure_replans_into_rag() {
    let good_answer = "크리에이터 온보딩 등급 정책은 평가 점수에 따라 S, A, B, C 네 단계로 \
                       운영됩니다. 각 등급은 팔로워 규모와 참여율, 활동 빈도를 종합해 결정되며 \
                       상위 등급일수록 더 많은 미션 기회가 제공됩니다.";
    let harness = build_harness(
        vec![
            // router intent: low confidence so the planner engages
            "{\"intent\": \"mission_matching\", \"confidence\": 0.5}".to_string(),
            // query expansion
            "등급 정책 기준".to_string(),
            // RAG generation
            good_answer.to_string(),
            // hallucination check
            "YES".to_string(),
            // refinement
            format!("{good_answer} 궁금한 점이 있으면 알려주세요!"),
        ],
        vec![
            plan_json("mission", false, true),
            plan_json("rag", true, false),
        ],
    );
    seed_corpus(&harness).await;

    // Open the web breaker before the run: the enrichment pass must skip.
    let web = harness
        .breakers
        .get_breaker("mcp_web", 3, std::time::Duration::from_secs(30));
    web.failure("down");
    web.failure("down");
    web.failure("down");

    let response = harness
        .orchestrator
        .run(OrchestratorRequest::new("크리에이터 등급 정책 알려줘").with_session("tool-fail"))
        .await;
    assert!(response.success);

    let state = harness
        .saver
        .get("tool-fail")
        .await
        .unwrap()
        .expect("state saved");
    assert!(state.replan_result.ran);
    assert_eq!(state.loop_count, 1);
    let plan = state.plan.as_ref().expect("replanned plan present");
    assert!(!plan.needs_tools);
    assert!(plan.needs_rag);
    assert!(state.rag_result.is_some(), "RAG stage executed after replan");
    assert_eq!(state.current_step, "completed");
    assert!(state
        .audit_trail
        .iter()
        .any(|a| a.step == "replan_request"));
}

/// Scenario: weak RAG answer → replan; once the loop budget is exhausted the
/// final answer carries a frank insufficient-information note.
#[tokio::test]
async fn weak_rag_answer_replans_until_budget() {
    let weak_answer = "제공된 문서에서 관련 근거를 찾을 수 없습니다. 추가 정보가 필요합니다.";
    let harness = build_harness(
        vec![
            // router intent: ambiguous
            "{\"intent\": \"general_chat\", \"confidence\": 0.9}".to_string(),
            // expansion
            "정책 자료".to_string(),
            // generation: weak, uncertainty-marked answer
            weak_answer.to_string(),
            // hallucination check
            "YES".to_string(),
            // refinement keeps the uncertainty marker
            format!("{weak_answer} 원문 출처를 확인해주세요."),
        ],
        vec![
            plan_json("rag", true, false),
            plan_json("rag", true, false),
            plan_json("rag", true, false),
        ],
    );
    seed_corpus(&harness).await;

    let response = harness
        .orchestrator
        .run(
            OrchestratorRequest::new("최신 보상 정책 내용 알려주세요").with_session("weak-rag"),
        )
        .await;
    assert!(response.success);

    let state = harness.saver.get("weak-rag").await.unwrap().expect("state saved");
    assert_eq!(state.loop_count, state.max_loops, "budget fully consumed");
    assert!(state
        .audit_trail
        .iter()
        .any(|a| a.step == "rag_quality_gate"));

    let answer = response.response.expect("final answer present");
    assert!(
        answer.contains("충분한 근거 자료를 찾지 못했습니다") || answer.contains("찾을 수 없"),
        "answer admits insufficient information: {answer}"
    );
}

/// Invariant: loop_count never exceeds max_loops in any of the above runs.
#[tokio::test]
async fn loop_budget_is_always_respected() {
    let harness = build_harness(
        vec!["{\"intent\": \"general_chat\", \"confidence\": 0.9}".to_string(); 12],
        vec![plan_json("rag", true, false); 12],
    );
    // No corpus seeded: every RAG pass retrieves nothing, which keeps the
    // quality gate firing until the budget stops it.
    let response = harness
        .orchestrator
        .run(OrchestratorRequest::new("정책 관련 자료 알려주세요").with_session("budget"))
        .await;
    assert!(response.success);
    let state = harness.saver.get("budget").await.unwrap().expect("state saved");
    assert!(state.loop_count <= state.max_loops);
    assert_eq!(state.current_step, "completed");
}

/// Invariant: a normally-ending run exposes its thread id and the stored
/// state is a superset of what the response reports.
#[tokio::test]
async fn response_matches_checkpointed_state() {
    let harness = build_harness(
        vec!["{\"intent\": \"general_chat\", \"confidence\": 0.9}".to_string(); 6],
        vec![plan_json("general", false, false); 6],
    );
    let response = harness
        .orchestrator
        .run(OrchestratorRequest::new("hello there").with_session("mirror"))
        .await;
    assert!(response.success);
    assert_eq!(response.thread_id, "mirror");
    assert_eq!(response.workflow_type, WorkflowType::General);

    let state = harness.saver.get("mirror").await.unwrap().expect("state saved");
    assert_eq!(state.errors, response.errors);
    assert_eq!(state.audit_trail.len(), response.audit_trail.len());
    assert!(state.messages.iter().any(|m| m.is_assistant()));
}
