//! Creator evaluation feeding mission matching, standalone and through the
//! orchestrator's mission workflow.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use conductor::agents::{
    CreatorEvaluationInput, CreatorMetrics, CreatorOnboardingAgent, Decision, Grade, Mission,
    MissionAgent, MissionCandidateProfile, MissionFilters, MissionRequirement, OnboardingSummary,
};
use conductor::breaker::CircuitBreakerManager;
use conductor::config::Settings;
use conductor::llm::{GenerationEngine, MockLlm};
use conductor::mcp::McpIntegrationService;
use conductor::memory::MemorySaver;
use conductor::orchestrator::{Orchestrator, OrchestratorRequest, WorkflowType};
use conductor::retrieval::{HashEmbedder, RetrievalEngine};

/// Scenario: the evaluation result flows straight into the rule engine the
/// way the orchestrator's mission node consumes it.
#[tokio::test]
async fn evaluation_feeds_mission_matching() {
    let agent = CreatorOnboardingAgent::new().with_rag_enabled(false);
    let evaluation = agent
        .execute(&CreatorEvaluationInput {
            platform: "tiktok".into(),
            handle: "test_creator".into(),
            metrics: CreatorMetrics {
                followers: 250_000,
                avg_likes: 8_000,
                avg_comments: 500,
                posts_30d: 20,
                reports_90d: 0,
                brand_fit: 0.7,
                tags: vec!["fashion".into()],
            },
            ..Default::default()
        })
        .await;
    assert_eq!(evaluation.grade, Grade::A);
    assert_eq!(evaluation.decision, Decision::Accept);

    let profile = MissionCandidateProfile {
        creator_id: "creator_1".into(),
        platform: evaluation.platform.clone(),
        followers: 250_000,
        engagement_rate: 0.036,
        posts_30d: 20,
        reports_90d: 0,
        ..Default::default()
    };
    let onboarding = OnboardingSummary {
        grade: evaluation.grade.as_str().to_string(),
        tags: vec!["fashion".into()],
        risks: evaluation.risks.clone(),
    };
    let missions = vec![Mission {
        id: "m1".into(),
        name: "Fashion mission".into(),
        mission_type: "content".into(),
        reward_type: Default::default(),
        reward_amount: 150_000.0,
        currency: "KRW".into(),
        requirement: MissionRequirement {
            min_followers: 50_000,
            min_engagement_rate: 0.02,
            min_posts_30d: 5,
            min_grade: Some("C".into()),
            allowed_platforms: vec!["tiktok".into()],
            required_tags: vec!["fashion".into()],
            ..Default::default()
        },
    }];
    let recommendations = MissionAgent::new(10.0, 3).recommend(
        &profile,
        &onboarding,
        &missions,
        &MissionFilters::default(),
        None,
    );
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0].mission_id, "m1");
    assert!(recommendations[0].score >= 10.0);
}

/// Scenario: the orchestrator's mission workflow consumes context-provided
/// profile/onboarding/missions and surfaces recommendations in the envelope.
#[tokio::test]
async fn orchestrator_mission_workflow() {
    let settings = Settings::default();
    let retrieval = Arc::new(RetrievalEngine::new(
        settings.retrieval.clone(),
        Arc::new(HashEmbedder),
    ));
    let mut engine = GenerationEngine::from_settings(&settings);
    engine.register_model(Arc::new(MockLlm::fixed(
        "gemini-2.0-flash",
        "{\"intent\": \"mission_matching\", \"confidence\": 0.9}",
    )));
    engine.register_model(Arc::new(MockLlm::fixed(
        "gpt-5.1",
        "## 미션 추천 결과\n요청하신 크리에이터에게 적합한 미션을 정리했습니다.",
    )));
    let mcp = Arc::new(
        McpIntegrationService::from_settings(&settings)
            .with_breaker_manager(Arc::new(CircuitBreakerManager::new())),
    );
    let saver: Arc<MemorySaver<conductor::orchestrator::OrchestratorState>> =
        Arc::new(MemorySaver::new());
    let orchestrator = Orchestrator::new(&settings, Arc::new(engine), retrieval, mcp, saver)
        .expect("graph compiles");

    let context = HashMap::from([
        (
            "creator_profile".to_string(),
            json!({
                "creator_id": "creator_1",
                "platform": "tiktok",
                "followers": 100_000,
                "engagement_rate": 0.05,
                "posts_30d": 10,
                "reports_90d": 0,
            }),
        ),
        (
            "onboarding_result".to_string(),
            json!({"grade": "A", "tags": ["fashion"], "risks": []}),
        ),
        (
            "missions".to_string(),
            json!([
                {
                    "id": "m1",
                    "name": "High tier content mission",
                    "type": "content",
                    "reward_amount": 150000.0,
                    "currency": "KRW",
                    "requirement": {
                        "min_followers": 50000,
                        "min_engagement_rate": 0.02,
                        "min_posts_30d": 5,
                        "min_grade": "C",
                        "allowed_platforms": ["tiktok"],
                        "disallow_high_reports": true,
                        "max_reports_90d": 3,
                        "required_tags": ["fashion"]
                    }
                },
                {
                    "id": "m2",
                    "name": "Too strict mission",
                    "type": "content",
                    "reward_amount": 500000.0,
                    "currency": "KRW",
                    "requirement": {
                        "min_followers": 1000000,
                        "min_engagement_rate": 0.1,
                        "min_posts_30d": 30,
                        "min_grade": "S",
                        "allowed_platforms": ["instagram"]
                    }
                }
            ]),
        ),
    ]);

    let response = orchestrator
        .run(
            OrchestratorRequest::new("이 크리에이터에게 맞는 미션 추천해줘")
                .with_session("mission-flow")
                .with_context(context),
        )
        .await;

    assert!(response.success);
    assert_eq!(response.workflow_type, WorkflowType::Mission);
    assert_eq!(response.mission_recommendations.len(), 1);
    assert_eq!(response.mission_recommendations[0].mission_id, "m1");
    assert!(response
        .mission_recommendations[0]
        .reasons
        .iter()
        .any(|r| r.contains("참여율")));
    assert!(response.state_saved);
    assert!(response.response.is_some());
}
