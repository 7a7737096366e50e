//! Competency assessment: anonymize, aggregate, classify, recommend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

/// One survey/diagnostic response.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CompetencyResponse {
    pub area: String,
    /// Normalized 0..1.
    pub response_value: f64,
    #[serde(default)]
    pub response_time: f64,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    /// PII; cleared during preprocessing.
    #[serde(default)]
    pub respondent: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_confidence() -> f64 {
    0.5
}

/// Assessment output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompetencyAssessment {
    pub assessment_id: String,
    pub competency_scores: HashMap<String, f64>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub overall_level: String,
    pub recommendations: Vec<String>,
}

/// Clears PII fields in place before any aggregation.
pub fn anonymize(responses: &mut [CompetencyResponse]) {
    for r in responses.iter_mut() {
        r.respondent = None;
        r.email = None;
    }
}

fn weighted_area_scores(responses: &[CompetencyResponse]) -> HashMap<String, f64> {
    let mut grouped: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
    for r in responses {
        grouped
            .entry(r.area.clone())
            .or_default()
            .push((r.response_value.clamp(0.0, 1.0), r.confidence_score.max(0.0)));
    }
    grouped
        .into_iter()
        .map(|(area, pairs)| {
            let weight_sum: f64 = pairs.iter().map(|(_, w)| w).sum();
            let score = if weight_sum > EPSILON {
                pairs.iter().map(|(v, w)| v * w).sum::<f64>() / weight_sum
            } else {
                let n = pairs.len().max(1) as f64;
                pairs.iter().map(|(v, _)| v).sum::<f64>() / n
            };
            (area, score)
        })
        .collect()
}

fn overall_level(scores: &HashMap<String, f64>) -> &'static str {
    if scores.is_empty() {
        return "beginner";
    }
    let avg: f64 = scores.values().sum::<f64>() / scores.len() as f64;
    if avg >= 0.8 - EPSILON {
        "expert"
    } else if avg >= 0.6 - EPSILON {
        "advanced"
    } else if avg >= 0.4 - EPSILON {
        "intermediate"
    } else {
        "beginner"
    }
}

/// Areas in the top quartile by score (always at least one when non-empty).
fn quartile_split(scores: &HashMap<String, f64>) -> (Vec<String>, Vec<String>) {
    if scores.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let mut ordered: Vec<(&String, &f64)> = scores.iter().collect();
    ordered.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
    let quarter = (ordered.len() as f64 / 4.0).ceil() as usize;
    let strengths = ordered[..quarter.min(ordered.len())]
        .iter()
        .map(|(a, _)| (*a).clone())
        .collect();
    let weaknesses = ordered[ordered.len() - quarter.min(ordered.len())..]
        .iter()
        .map(|(a, _)| (*a).clone())
        .collect();
    (strengths, weaknesses)
}

fn recommendations_for(weaknesses: &[String], scores: &HashMap<String, f64>) -> Vec<String> {
    let mut ranked: Vec<&String> = weaknesses.iter().collect();
    ranked.sort_by(|a, b| {
        let sa = scores.get(*a).copied().unwrap_or(0.0);
        let sb = scores.get(*b).copied().unwrap_or(0.0);
        sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
        .into_iter()
        .map(|area| format!("{area} 영역 보강 학습을 우선 진행하세요."))
        .collect()
}

/// Competency diagnosis agent.
pub struct CompetencyAgent;

impl CompetencyAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, mut responses: Vec<CompetencyResponse>) -> CompetencyAssessment {
        anonymize(&mut responses);
        let competency_scores = weighted_area_scores(&responses);
        let (strengths, weaknesses) = quartile_split(&competency_scores);
        let level = overall_level(&competency_scores);
        let recommendations = recommendations_for(&weaknesses, &competency_scores);
        CompetencyAssessment {
            assessment_id: uuid::Uuid::new_v4().to_string(),
            overall_level: level.to_string(),
            competency_scores,
            strengths,
            weaknesses,
            recommendations,
        }
    }
}

impl Default for CompetencyAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(area: &str, value: f64, confidence: f64) -> CompetencyResponse {
        CompetencyResponse {
            area: area.to_string(),
            response_value: value,
            response_time: 1.0,
            confidence_score: confidence,
            respondent: Some("실명".to_string()),
            email: Some("a@b.c".to_string()),
        }
    }

    /// **Scenario**: PII fields are cleared before aggregation.
    #[test]
    fn anonymize_clears_pii() {
        let mut responses = vec![response("기획", 0.9, 1.0)];
        anonymize(&mut responses);
        assert!(responses[0].respondent.is_none());
        assert!(responses[0].email.is_none());
    }

    /// **Scenario**: confidence weights shift the area average toward the
    /// high-confidence answer.
    #[test]
    fn confidence_weighted_average() {
        let scores = weighted_area_scores(&[
            response("편집", 1.0, 0.9),
            response("편집", 0.0, 0.1),
        ]);
        assert!((scores["편집"] - 0.9).abs() < 1e-9);
    }

    /// **Scenario**: level bands at 0.8/0.6/0.4 with epsilon tolerance.
    #[test]
    fn level_bands() {
        let mk = |v: f64| HashMap::from([("a".to_string(), v)]);
        assert_eq!(overall_level(&mk(0.8)), "expert");
        assert_eq!(overall_level(&mk(0.79)), "advanced");
        assert_eq!(overall_level(&mk(0.6)), "advanced");
        assert_eq!(overall_level(&mk(0.4)), "intermediate");
        assert_eq!(overall_level(&mk(0.39)), "beginner");
    }

    /// **Scenario**: full run yields quartile strengths/weaknesses and
    /// prioritized recommendations.
    #[test]
    fn full_assessment() {
        let agent = CompetencyAgent::new();
        let responses = vec![
            response("기획", 0.95, 1.0),
            response("편집", 0.7, 1.0),
            response("촬영", 0.55, 1.0),
            response("마케팅", 0.2, 1.0),
        ];
        let assessment = agent.execute(responses);
        assert_eq!(assessment.strengths, vec!["기획".to_string()]);
        assert_eq!(assessment.weaknesses, vec!["마케팅".to_string()]);
        assert_eq!(assessment.overall_level, "advanced");
        assert!(assessment.recommendations[0].contains("마케팅"));
        assert!(!assessment.assessment_id.is_empty());
    }
}
