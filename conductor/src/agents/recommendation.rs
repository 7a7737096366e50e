//! Recommendation agent: rule-based learning recommendations from the
//! competency assessment and interests.

use serde::{Deserialize, Serialize};

use super::competency::CompetencyAssessment;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub title: String,
    pub reason: String,
    pub priority: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecommendationData {
    pub recommendations: Vec<RecommendationItem>,
    pub reasoning: String,
}

pub struct RecommendationAgent;

impl RecommendationAgent {
    pub fn new() -> Self {
        Self
    }

    /// Weak areas first, then interest-driven growth items.
    pub fn execute(
        &self,
        assessment: Option<&CompetencyAssessment>,
        interests: &[String],
    ) -> RecommendationData {
        let mut items = Vec::new();
        let mut priority = 1u32;

        if let Some(a) = assessment {
            for area in &a.weaknesses {
                items.push(RecommendationItem {
                    title: format!("{area} 기초 과정"),
                    reason: format!("역량진단에서 {area} 영역이 하위권으로 나타났습니다."),
                    priority,
                });
                priority += 1;
            }
            for area in &a.strengths {
                items.push(RecommendationItem {
                    title: format!("{area} 심화 과정"),
                    reason: format!("{area} 영역 강점을 전문성으로 발전시킬 수 있습니다."),
                    priority,
                });
                priority += 1;
            }
        }
        for interest in interests.iter().take(3) {
            items.push(RecommendationItem {
                title: format!("{interest} 트렌드 워크숍"),
                reason: format!("관심 분야({interest}) 기반 추천입니다."),
                priority,
            });
            priority += 1;
        }

        let reasoning = match assessment {
            Some(a) => format!(
                "역량 수준({})과 약점 영역 {}개를 반영한 추천입니다.",
                a.overall_level,
                a.weaknesses.len()
            ),
            None => "역량진단 없이 관심사 기반으로 구성한 추천입니다.".to_string(),
        };

        RecommendationData {
            recommendations: items,
            reasoning,
        }
    }
}

impl Default for RecommendationAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::competency::{CompetencyAgent, CompetencyResponse};

    /// **Scenario**: weakness-driven items come first; reasoning names the
    /// level.
    #[test]
    fn weaknesses_rank_first() {
        let assessment = CompetencyAgent::new().execute(vec![
            CompetencyResponse {
                area: "기획".into(),
                response_value: 0.9,
                response_time: 1.0,
                confidence_score: 1.0,
                respondent: None,
                email: None,
            },
            CompetencyResponse {
                area: "마케팅".into(),
                response_value: 0.2,
                response_time: 1.0,
                confidence_score: 1.0,
                respondent: None,
                email: None,
            },
        ]);
        let data = RecommendationAgent::new().execute(Some(&assessment), &["뷰티".to_string()]);
        assert!(data.recommendations[0].title.contains("마케팅"));
        assert!(data.reasoning.contains(&assessment.overall_level));
        assert!(data
            .recommendations
            .iter()
            .any(|r| r.title.contains("뷰티")));
    }

    /// **Scenario**: without an assessment, interests alone drive the list.
    #[test]
    fn interests_only() {
        let data = RecommendationAgent::new().execute(None, &["게임".to_string()]);
        assert_eq!(data.recommendations.len(), 1);
        assert!(data.reasoning.contains("관심사"));
    }
}
