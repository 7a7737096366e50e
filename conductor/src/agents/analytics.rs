//! Analytics agent: learning-progress, engagement and performance reports.
//!
//! Metrics come from a provider; the sample provider stands in when no real
//! database is wired (the production provider is an external collaborator).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Report selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    LearningProgress,
    Engagement,
    Performance,
}

impl ReportType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "engagement" => ReportType::Engagement,
            "performance" => ReportType::Performance,
            _ => ReportType::LearningProgress,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub completion_rate: f64,
    pub avg_score: f64,
    pub time_spent_hours: f64,
    pub modules_completed: u32,
    pub modules_total: u32,
    pub streak_days: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngagementMetrics {
    /// Logins per week.
    pub login_frequency: f64,
    pub avg_session_duration: f64,
    /// Percent, 0..100.
    pub participation_rate: f64,
    pub interaction_count: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub test_scores: Vec<f64>,
    pub avg_test_score: f64,
    pub improvement_rate: f64,
}

/// Metrics source.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn learning_metrics(&self, user_id: Option<&str>) -> LearningMetrics;
    async fn engagement_metrics(&self, user_id: Option<&str>) -> EngagementMetrics;
    async fn performance_metrics(&self, user_id: Option<&str>) -> PerformanceMetrics;
}

/// Deterministic sample data, used when no database is configured.
pub struct SampleMetricsProvider;

#[async_trait]
impl MetricsProvider for SampleMetricsProvider {
    async fn learning_metrics(&self, _user_id: Option<&str>) -> LearningMetrics {
        LearningMetrics {
            completion_rate: 72.5,
            avg_score: 84.0,
            time_spent_hours: 18.5,
            modules_completed: 29,
            modules_total: 40,
            streak_days: 6,
        }
    }

    async fn engagement_metrics(&self, _user_id: Option<&str>) -> EngagementMetrics {
        EngagementMetrics {
            login_frequency: 5.0,
            avg_session_duration: 34.0,
            participation_rate: 68.0,
            interaction_count: 52,
        }
    }

    async fn performance_metrics(&self, _user_id: Option<&str>) -> PerformanceMetrics {
        PerformanceMetrics {
            test_scores: vec![72.0, 78.0, 85.0],
            avg_test_score: 78.3,
            improvement_rate: 13.0,
        }
    }
}

/// One generated report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub report_type: ReportType,
    pub metrics: Value,
    pub analysis: Value,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Trend label from the completion rate.
fn learning_trend(completion_rate: f64) -> &'static str {
    if completion_rate >= 80.0 {
        "excellent"
    } else if completion_rate >= 60.0 {
        "good"
    } else if completion_rate >= 40.0 {
        "moderate"
    } else {
        "needs_improvement"
    }
}

/// Composite engagement score: 30% login frequency (weekly cap), 50%
/// participation, 20% interaction volume (100 cap).
fn engagement_score(m: &EngagementMetrics) -> f64 {
    let login = (m.login_frequency / 7.0).min(1.0);
    let participation = m.participation_rate / 100.0;
    let interaction = (f64::from(m.interaction_count) / 100.0).min(1.0);
    let score = (login * 0.3 + participation * 0.5 + interaction * 0.2) * 100.0;
    (score * 100.0).round() / 100.0
}

fn performance_grade(avg_test_score: f64) -> &'static str {
    if avg_test_score >= 90.0 {
        "A"
    } else if avg_test_score >= 80.0 {
        "B"
    } else if avg_test_score >= 70.0 {
        "C"
    } else if avg_test_score >= 60.0 {
        "D"
    } else {
        "F"
    }
}

pub struct AnalyticsAgent {
    provider: std::sync::Arc<dyn MetricsProvider>,
}

impl AnalyticsAgent {
    pub fn new(provider: std::sync::Arc<dyn MetricsProvider>) -> Self {
        Self { provider }
    }

    pub fn with_sample_data() -> Self {
        Self::new(std::sync::Arc::new(SampleMetricsProvider))
    }

    pub async fn execute(&self, report_type: ReportType, user_id: Option<&str>) -> AnalyticsReport {
        match report_type {
            ReportType::LearningProgress => self.learning_report(user_id).await,
            ReportType::Engagement => self.engagement_report(user_id).await,
            ReportType::Performance => self.performance_report(user_id).await,
        }
    }

    async fn learning_report(&self, user_id: Option<&str>) -> AnalyticsReport {
        let m = self.provider.learning_metrics(user_id).await;
        let trend = learning_trend(m.completion_rate);
        let mut insights = Vec::new();
        if m.completion_rate >= 80.0 {
            insights.push("학습 진도가 우수합니다. 계속해서 좋은 페이스를 유지하세요.".to_string());
        } else if m.completion_rate >= 60.0 {
            insights.push("학습 진도가 양호합니다. 조금 더 집중하면 목표 달성이 가능합니다.".to_string());
        } else {
            insights.push("학습 진도가 다소 느립니다. 학습 시간을 늘리는 것을 권장합니다.".to_string());
        }
        let mut recommendations = Vec::new();
        if m.completion_rate < 60.0 {
            recommendations.push("주간 학습 목표를 작게 나누어 설정해보세요.".to_string());
        }
        if m.streak_days < 3 {
            recommendations.push("연속 학습일을 늘리면 완주율이 올라갑니다.".to_string());
        }
        AnalyticsReport {
            report_type: ReportType::LearningProgress,
            analysis: json!({
                "summary": "학습 진도 분석 결과",
                "completion_rate": m.completion_rate,
                "modules_completed": m.modules_completed,
                "modules_total": m.modules_total,
                "trend": trend,
            }),
            metrics: json!(m),
            insights,
            recommendations,
        }
    }

    async fn engagement_report(&self, user_id: Option<&str>) -> AnalyticsReport {
        let m = self.provider.engagement_metrics(user_id).await;
        let score = engagement_score(&m);
        let mut insights = Vec::new();
        if m.participation_rate >= 80.0 {
            insights.push("높은 참여도를 보이고 있습니다. 훌륭합니다!".to_string());
        } else if m.participation_rate < 50.0 {
            insights.push("참여도가 낮습니다. 더 적극적인 학습 활동이 필요합니다.".to_string());
        }
        let mut recommendations = Vec::new();
        if m.login_frequency < 3.0 {
            recommendations.push("주 3회 이상 접속을 목표로 해보세요.".to_string());
        }
        AnalyticsReport {
            report_type: ReportType::Engagement,
            analysis: json!({
                "summary": "참여도 분석 결과",
                "login_frequency": m.login_frequency,
                "participation_rate": m.participation_rate,
                "interaction_count": m.interaction_count,
                "engagement_score": score,
            }),
            metrics: json!(m),
            insights,
            recommendations,
        }
    }

    async fn performance_report(&self, user_id: Option<&str>) -> AnalyticsReport {
        let m = self.provider.performance_metrics(user_id).await;
        let grade = performance_grade(m.avg_test_score);
        let mut insights = Vec::new();
        if m.test_scores.len() >= 2 {
            let trend = m.test_scores[m.test_scores.len() - 1] - m.test_scores[0];
            if trend > 0.0 {
                insights.push(format!(
                    "테스트 점수가 지속적으로 향상되고 있습니다 (+{trend:.0}점)."
                ));
            } else if trend < 0.0 {
                insights.push("최근 테스트 점수가 하락했습니다. 복습이 필요할 수 있습니다.".to_string());
            }
        }
        let mut recommendations = Vec::new();
        if m.avg_test_score < 70.0 {
            recommendations.push("기초 개념 복습 과정을 추천합니다.".to_string());
        }
        AnalyticsReport {
            report_type: ReportType::Performance,
            analysis: json!({
                "summary": "성과 분석 결과",
                "test_scores": m.test_scores,
                "avg_test_score": m.avg_test_score,
                "improvement_rate": m.improvement_rate,
                "performance_grade": grade,
            }),
            metrics: json!(m),
            insights,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: trend thresholds at 80/60/40.
    #[test]
    fn trend_thresholds() {
        assert_eq!(learning_trend(80.0), "excellent");
        assert_eq!(learning_trend(79.9), "good");
        assert_eq!(learning_trend(60.0), "good");
        assert_eq!(learning_trend(40.0), "moderate");
        assert_eq!(learning_trend(39.9), "needs_improvement");
    }

    /// **Scenario**: engagement composite weights 0.3/0.5/0.2 with caps.
    #[test]
    fn engagement_composite() {
        let m = EngagementMetrics {
            login_frequency: 7.0,
            avg_session_duration: 30.0,
            participation_rate: 100.0,
            interaction_count: 100,
        };
        assert!((engagement_score(&m) - 100.0).abs() < 1e-9);

        let m = EngagementMetrics {
            login_frequency: 3.5,
            avg_session_duration: 30.0,
            participation_rate: 50.0,
            interaction_count: 50,
        };
        // 0.5*0.3 + 0.5*0.5 + 0.5*0.2 = 0.5
        assert!((engagement_score(&m) - 50.0).abs() < 1e-9);
    }

    /// **Scenario**: performance grade bands A/B/C/D/F at 90/80/70/60.
    #[test]
    fn performance_grades() {
        assert_eq!(performance_grade(90.0), "A");
        assert_eq!(performance_grade(89.9), "B");
        assert_eq!(performance_grade(70.0), "C");
        assert_eq!(performance_grade(60.0), "D");
        assert_eq!(performance_grade(59.9), "F");
    }

    /// **Scenario**: the sample provider produces a complete learning report.
    #[tokio::test]
    async fn sample_learning_report() {
        let agent = AnalyticsAgent::with_sample_data();
        let report = agent.execute(ReportType::LearningProgress, Some("u1")).await;
        assert_eq!(report.report_type, ReportType::LearningProgress);
        assert_eq!(report.analysis["trend"], "good");
        assert!(!report.insights.is_empty());
    }
}
