//! Fast intent router and the RAG keyword heuristic.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::llm::{GenerateOptions, GenerationEngine};

/// Intent labels the router may emit.
pub const INTENT_LABELS: &[&str] = &[
    "competency_assessment",
    "recommendation",
    "search",
    "analytics",
    "data_collection",
    "mission_matching",
    "general_chat",
];

/// Question/request indicators that push an ambiguous message toward RAG.
/// Literal, configurable lists on purpose: tests add and remove markers
/// without touching code paths.
pub const RAG_INDICATORS: &[&str] = &[
    "어떻게",
    "왜",
    "무엇을",
    "언제",
    "어디서",
    "설명해주세요",
    "알려주세요",
    "도와주세요",
    "관련",
    "정보",
    "자료",
    "내용",
    "최신",
    "현재",
    "최근",
    "정책",
    "제도",
    "법률",
    "규정",
];

/// Domain keywords that also warrant retrieval.
pub const RAG_DOMAIN_KEYWORDS: &[&str] = &["크리에이터", "미션", "온보딩", "브랜드", "캠페인", "보상"];

/// Router output.
#[derive(Clone, Debug)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct IntentWire {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

const ROUTER_SYSTEM_PROMPT: &str = r#"You are an intelligent router for a creator onboarding system.
Classify the user's input into one of these intents:
- competency_assessment: diagnose/evaluate skills.
- recommendation: learning materials/courses.
- search: fact retrieval/documents.
- analytics: reports/stats.
- data_collection: scrape/fetch data.
- mission_matching: brand missions.
- general_chat: greetings/other.
Output JSON only: {"intent": "...", "confidence": 0.0-1.0, "reasoning": "..."}"#;

/// Strips markdown code fences around a JSON payload.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Fast-model intent classifier.
pub struct IntentAnalyzer {
    engine: Arc<GenerationEngine>,
}

impl IntentAnalyzer {
    pub fn new(engine: Arc<GenerationEngine>) -> Self {
        Self { engine }
    }

    /// Classifies one message. Parse failures and unknown labels degrade to
    /// general_chat with zero confidence.
    pub async fn analyze(&self, query: &str) -> IntentResult {
        if !self.engine.has_models() {
            return IntentResult {
                intent: "general_chat".to_string(),
                confidence: 0.0,
                raw: Value::Null,
            };
        }
        let opts = GenerateOptions {
            system_prompt: Some(ROUTER_SYSTEM_PROMPT.to_string()),
            model_name: Some(self.engine.fast_model().to_string()),
            ..Default::default()
        };
        let response = self
            .engine
            .generate(&format!("User Input: {query}"), &opts)
            .await;
        let cleaned = strip_code_fences(&response);
        match serde_json::from_str::<IntentWire>(&cleaned) {
            Ok(wire) => {
                let mut intent = wire.intent;
                // Short aliases the model tends to emit.
                if intent == "competency" {
                    intent = "competency_assessment".to_string();
                }
                if intent == "mission" {
                    intent = "mission_matching".to_string();
                }
                if !INTENT_LABELS.contains(&intent.as_str()) {
                    intent = "general_chat".to_string();
                }
                IntentResult {
                    intent,
                    confidence: wire.confidence.clamp(0.0, 1.0),
                    raw: serde_json::json!({
                        "reasoning": wire.reasoning,
                        "response": cleaned,
                    }),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "intent parse failed");
                IntentResult {
                    intent: "general_chat".to_string(),
                    confidence: 0.0,
                    raw: Value::String(cleaned),
                }
            }
        }
    }
}

/// Keyword heuristic for ambiguous/general messages: question words, long
/// sentences, or domain keywords warrant retrieval.
pub fn should_use_rag(message: &str) -> bool {
    let lowered = message.to_lowercase();
    if RAG_INDICATORS.iter().any(|k| lowered.contains(k)) {
        return true;
    }
    if message.split_whitespace().count() > 10 {
        return true;
    }
    RAG_DOMAIN_KEYWORDS.iter().any(|k| lowered.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::llm::MockLlm;

    fn analyzer(responses: Vec<String>) -> IntentAnalyzer {
        let mut engine = GenerationEngine::from_settings(&Settings::default());
        engine.register_model(Arc::new(MockLlm::new("gemini-2.0-flash", responses)));
        IntentAnalyzer::new(Arc::new(engine))
    }

    /// **Scenario**: fenced JSON parses, aliases normalize, confidence
    /// clamps.
    #[tokio::test]
    async fn parses_and_normalizes() {
        let a = analyzer(vec![
            "```json\n{\"intent\": \"mission\", \"confidence\": 1.4, \"reasoning\": \"brand\"}\n```".into(),
        ]);
        let out = a.analyze("미션 매칭해줘").await;
        assert_eq!(out.intent, "mission_matching");
        assert!((out.confidence - 1.0).abs() < 1e-9);
    }

    /// **Scenario**: malformed output degrades to general_chat confidence 0.
    #[tokio::test]
    async fn parse_failure_degrades() {
        let a = analyzer(vec!["이건 JSON이 아닙니다".into()]);
        let out = a.analyze("hello").await;
        assert_eq!(out.intent, "general_chat");
        assert_eq!(out.confidence, 0.0);
    }

    /// **Scenario**: unknown labels are rejected.
    #[tokio::test]
    async fn unknown_label_rejected() {
        let a = analyzer(vec!["{\"intent\": \"world_domination\", \"confidence\": 0.9}".into()]);
        let out = a.analyze("hi").await;
        assert_eq!(out.intent, "general_chat");
    }

    /// **Scenario**: each rag heuristic disjunct fires independently:
    /// question word, long sentence, domain keyword.
    #[test]
    fn rag_heuristic_disjuncts() {
        assert!(should_use_rag("이 제도는 어떻게 운영되나요"));
        assert!(should_use_rag("a b c d e f g h i j k"));
        assert!(should_use_rag("크리에이터 등급"));
        assert!(!should_use_rag("안녕"));
    }
}
