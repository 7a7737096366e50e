//! Deep agents: complexity gate plus an iterative self-critique loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::DeepAgentConfig;
use crate::llm::{GenerateOptions, GenerationEngine};

/// Complexity indicators; two or more hits (including length and sentence
/// bonuses) trip the gate.
const COMPLEXITY_INDICATORS: &[&str] = &[
    "비교",
    "분석",
    "종합",
    "평가",
    "장단점",
    "차이점",
    "공통점",
    "아키텍처",
    "설계",
    "구현",
    "최적화",
    "전략",
    "프레임워크",
    "시스템",
    "단계별",
    "순차적",
    "체계적",
    "완성해줘",
    "만들어줘",
    "개발해줘",
    "compare",
    "analyze",
    "evaluate",
    "architecture",
    "design",
    "implement",
];

/// Outcome of one deep-agents run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeepAgentsOutcome {
    pub success: bool,
    pub iterations: u32,
    pub quality_score: f64,
    pub result: serde_json::Value,
}

/// Iterative self-critique agent for complex queries.
pub struct DeepAgents {
    engine: Arc<GenerationEngine>,
    config: DeepAgentConfig,
}

impl DeepAgents {
    pub fn new(engine: Arc<GenerationEngine>, config: DeepAgentConfig) -> Self {
        Self { engine, config }
    }

    /// Keyword + length + sentence-count heuristic. Complexity score of 2 or
    /// more trips the gate.
    pub fn should_use_deep_agents(&self, query: &str) -> bool {
        if query.is_empty() {
            return false;
        }
        let lowered = query.to_lowercase();
        let mut score = COMPLEXITY_INDICATORS
            .iter()
            .filter(|k| lowered.contains(*k))
            .count();
        if query.chars().count() > 300 {
            score += 1;
        }
        let sentences = query
            .split(['.', '?', '!', '。', '？', '！'])
            .filter(|s| !s.trim().is_empty())
            .count();
        if sentences > 3 {
            score += 1;
        }
        score >= 2
    }

    /// Initial answer, then critic rounds that stop early once the quality
    /// threshold is met. Bounded by both critic_rounds and max_steps.
    pub async fn execute(&self, query: &str) -> DeepAgentsOutcome {
        if !self.engine.has_models() {
            return DeepAgentsOutcome {
                success: false,
                result: json!({"error": "no usable model"}),
                ..Default::default()
            };
        }
        let deep_opts = || GenerateOptions {
            complexity_hint: Some("deep".to_string()),
            ..Default::default()
        };

        let mut answer = self.engine.generate(query, &deep_opts()).await;
        let mut iterations = 1u32;
        let mut quality = 0.0f64;

        for _ in 0..self.config.critic_rounds {
            if iterations >= self.config.max_steps {
                break;
            }
            let critique_prompt = format!(
                "다음 답변의 품질을 0.0~1.0 숫자 하나로만 평가하세요.\n\n질문:\n{query}\n\n답변:\n{answer}"
            );
            let verdict = self
                .engine
                .generate(
                    &critique_prompt,
                    &GenerateOptions {
                        latency_hint: Some("fast".to_string()),
                        ..Default::default()
                    },
                )
                .await;
            quality = parse_quality(&verdict);
            if quality >= self.config.quality_threshold {
                break;
            }
            let improve_prompt = format!(
                "아래 답변을 개선하세요. 부족한 근거를 보완하고 구조를 다듬되 사실을 바꾸지 마세요.\n\n질문:\n{query}\n\n현재 답변:\n{answer}"
            );
            answer = self.engine.generate(&improve_prompt, &deep_opts()).await;
            iterations += 1;
        }

        DeepAgentsOutcome {
            success: true,
            iterations,
            quality_score: quality,
            result: json!({
                "answer": answer,
                "metadata": {
                    "needs_rag": false,
                    "needs_competency": false,
                    "needs_recommendation": false,
                }
            }),
        }
    }
}

/// First 0..1 float found in a critic verdict; malformed verdicts score 0.
fn parse_quality(verdict: &str) -> f64 {
    for token in verdict.split(|c: char| !(c.is_ascii_digit() || c == '.')) {
        if token.is_empty() {
            continue;
        }
        if let Ok(v) = token.parse::<f64>() {
            if (0.0..=1.0).contains(&v) {
                return v;
            }
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::llm::MockLlm;

    fn deep(engine_responses: Vec<String>) -> DeepAgents {
        let mut engine = GenerationEngine::from_settings(&Settings::default());
        engine.register_model(Arc::new(MockLlm::new("gpt-5.1", engine_responses)));
        DeepAgents::new(Arc::new(engine), DeepAgentConfig::default())
    }

    /// **Scenario**: the gate trips on two complexity keywords, on keyword +
    /// length, and stays closed for simple questions.
    #[test]
    fn gate_heuristics() {
        let agent = deep(vec![]);
        assert!(agent.should_use_deep_agents("시스템 아키텍처를 설계하고 장단점을 비교해줘"));
        let long_tail = "구현 방법이 궁금합니다 ".repeat(30);
        assert!(agent.should_use_deep_agents(&long_tail));
        assert!(!agent.should_use_deep_agents("안녕하세요"));
        assert!(!agent.should_use_deep_agents(""));
    }

    /// **Scenario**: a high first critique ends the loop after one iteration.
    #[tokio::test]
    async fn early_exit_on_quality() {
        let agent = deep(vec!["초기 답변".into(), "0.9".into()]);
        let out = agent.execute("아키텍처 설계 비교 분석").await;
        assert!(out.success);
        assert_eq!(out.iterations, 1);
        assert!((out.quality_score - 0.9).abs() < 1e-9);
        assert_eq!(out.result["answer"], "초기 답변");
    }

    /// **Scenario**: low critiques drive improvement rounds up to the
    /// critic budget.
    #[tokio::test]
    async fn improves_until_budget() {
        let agent = deep(vec![
            "초안".into(),
            "0.2".into(),
            "개선본 1".into(),
            "0.4".into(),
            "개선본 2".into(),
        ]);
        let out = agent.execute("시스템 설계 평가").await;
        assert!(out.success);
        assert_eq!(out.iterations, 3);
        assert_eq!(out.result["answer"], "개선본 2");
    }

    #[test]
    fn quality_parsing() {
        assert!((parse_quality("0.85") - 0.85).abs() < 1e-9);
        assert!((parse_quality("품질: 0.7 정도입니다") - 0.7).abs() < 1e-9);
        assert_eq!(parse_quality("알 수 없음"), 0.0);
    }
}
