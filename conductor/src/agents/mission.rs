//! Mission recommendation: a pure rule engine.
//!
//! Hard requirement filters first (any failure drops the mission), then a
//! weighted composite score, then risk penalties. The top_k survivors come
//! back ordered by score.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::metrics::metrics_collector;

/// Reward scheme of a mission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    #[default]
    Fixed,
    Performance,
    Hybrid,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Fixed => "fixed",
            RewardType::Performance => "performance",
            RewardType::Hybrid => "hybrid",
        }
    }
}

fn default_max_reports() -> u32 {
    999
}

/// Hard and soft requirements of one mission.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MissionRequirement {
    #[serde(default)]
    pub min_followers: u64,
    #[serde(default)]
    pub max_followers: Option<u64>,
    #[serde(default)]
    pub min_engagement_rate: f64,
    #[serde(default)]
    pub min_posts_30d: u32,
    #[serde(default)]
    pub min_grade: Option<String>,
    #[serde(default)]
    pub allowed_platforms: Vec<String>,
    #[serde(default)]
    pub allowed_categories: Vec<String>,
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    #[serde(default)]
    pub required_tags: Vec<String>,
    #[serde(default)]
    pub exclude_risks: Vec<String>,
    #[serde(default)]
    pub disallow_high_reports: bool,
    #[serde(default = "default_max_reports")]
    pub max_reports_90d: u32,
}

/// One candidate mission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub mission_type: String,
    #[serde(default)]
    pub reward_type: RewardType,
    #[serde(default)]
    pub reward_amount: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub requirement: MissionRequirement,
}

/// Assignment lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionAssignmentStatus {
    Recommended,
    Accepted,
    Declined,
    Completed,
}

/// One recommendation handed back to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionAssignment {
    pub id: String,
    pub mission_id: String,
    pub creator_id: String,
    pub status: MissionAssignmentStatus,
    pub score: f64,
    pub reasons: Vec<String>,
    pub metadata: Value,
}

/// Creator-side inputs to the rule engine.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MissionCandidateProfile {
    #[serde(default, alias = "id")]
    pub creator_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default, alias = "followers_count")]
    pub followers: u64,
    #[serde(default)]
    pub engagement_rate: f64,
    #[serde(default)]
    pub posts_30d: u32,
    #[serde(default)]
    pub reports_90d: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub completed_missions: u32,
    #[serde(default)]
    pub avg_quality_score: f64,
    #[serde(default)]
    pub current_active_missions: u32,
    #[serde(default)]
    pub recent_mission_types: Vec<String>,
}

/// Onboarding evaluation summary consumed by the rule engine.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OnboardingSummary {
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Caller-supplied filters applied before scoring.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MissionFilters {
    #[serde(default)]
    pub mission_types: Vec<String>,
    #[serde(default)]
    pub min_reward: f64,
}

fn grade_rank(grade: &str) -> u32 {
    match grade.to_uppercase().as_str() {
        "S" => 4,
        "A" => 3,
        "B" => 2,
        "C" => 1,
        _ => 0,
    }
}

/// Rule-based mission matcher.
pub struct MissionAgent {
    min_score_for_recommendation: f64,
    top_k: usize,
}

impl Default for MissionAgent {
    fn default() -> Self {
        Self {
            min_score_for_recommendation: 50.0,
            top_k: 5,
        }
    }
}

impl MissionAgent {
    pub fn new(min_score_for_recommendation: f64, top_k: usize) -> Self {
        Self {
            min_score_for_recommendation,
            top_k,
        }
    }

    /// Scores and filters the candidate missions, returning the top_k
    /// ordered by score.
    pub fn recommend(
        &self,
        profile: &MissionCandidateProfile,
        onboarding: &OnboardingSummary,
        missions: &[Mission],
        filters: &MissionFilters,
        youtube_insights: Option<&Value>,
    ) -> Vec<MissionAssignment> {
        let external_signals = external_signals(youtube_insights);

        let mut assignments: Vec<MissionAssignment> = missions
            .iter()
            .filter(|m| {
                filters.mission_types.is_empty()
                    || filters.mission_types.contains(&m.mission_type)
            })
            .filter(|m| filters.min_reward <= 0.0 || m.reward_amount >= filters.min_reward)
            .filter_map(|m| {
                let (score, reasons) = self.score_mission(m, profile, onboarding);
                if score < self.min_score_for_recommendation {
                    return None;
                }
                Some(MissionAssignment {
                    id: format!("{}::{}", profile.creator_id, m.id),
                    mission_id: m.id.clone(),
                    creator_id: profile.creator_id.clone(),
                    status: MissionAssignmentStatus::Recommended,
                    score,
                    reasons,
                    metadata: json!({
                        "mission_name": m.name,
                        "mission_type": m.mission_type,
                        "reward_type": m.reward_type.as_str(),
                        "external_signals": external_signals,
                    }),
                })
            })
            .collect();

        assignments.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        assignments.truncate(self.top_k);
        metrics_collector().record_mission_recommendations(assignments.len());
        assignments
    }

    /// 0..100 fitness of one mission for one creator, plus reasons.
    fn score_mission(
        &self,
        mission: &Mission,
        profile: &MissionCandidateProfile,
        onboarding: &OnboardingSummary,
    ) -> (f64, Vec<String>) {
        let req = &mission.requirement;
        let mut reasons: Vec<String> = Vec::new();
        let platform = profile.platform.to_lowercase();
        let category = profile.category.to_lowercase();
        let grade = onboarding.grade.as_str();

        // Hard eligibility filters: any failure is a zero.
        if !req.allowed_platforms.is_empty()
            && !platform.is_empty()
            && !req.allowed_platforms.contains(&platform)
        {
            return (0.0, vec!["플랫폼이 미션 요구 조건에 맞지 않습니다.".into()]);
        }
        if profile.followers < req.min_followers {
            return (0.0, vec!["팔로워 수가 미션 최소 요구 조건보다 낮습니다.".into()]);
        }
        if let Some(max) = req.max_followers {
            if profile.followers > max {
                return (0.0, vec!["팔로워 수가 이 미션의 타겟 상한을 초과합니다.".into()]);
            }
        }
        if profile.posts_30d < req.min_posts_30d {
            return (0.0, vec!["최근 30일 게시물 수가 부족합니다.".into()]);
        }
        if req.disallow_high_reports && profile.reports_90d >= 3 {
            return (
                0.0,
                vec!["최근 신고 이력이 많아 이 미션에는 추천하지 않습니다.".into()],
            );
        }
        if profile.reports_90d > req.max_reports_90d {
            return (
                0.0,
                vec!["최근 90일 신고 수가 미션 허용 범위를 초과합니다.".into()],
            );
        }
        if let Some(min_grade) = &req.min_grade {
            if grade_rank(grade) < grade_rank(min_grade) {
                return (
                    0.0,
                    vec![format!(
                        "온보딩 등급이 미션 최소 요구 등급({min_grade})에 미치지 못합니다."
                    )],
                );
            }
        }
        if req.excluded_categories.contains(&category) {
            return (0.0, vec!["크리에이터 카테고리가 미션에서 제외됩니다.".into()]);
        }
        if !req.allowed_categories.is_empty()
            && !category.is_empty()
            && !req.allowed_categories.contains(&category)
        {
            return (
                0.0,
                vec!["크리에이터 카테고리가 미션 허용 카테고리에 포함되지 않습니다.".into()],
            );
        }
        for risk in &onboarding.risks {
            if req.exclude_risks.contains(risk) {
                return (
                    0.0,
                    vec![format!("리스크 태그({risk})로 인해 이 미션에서는 제외됩니다.")],
                );
            }
        }

        let mut score = 0.0;

        // Grade fit, 25%.
        if let Some(min_grade) = &req.min_grade {
            let diff = grade_rank(grade).saturating_sub(grade_rank(min_grade));
            let grade_fit = (f64::from(diff) / 3.0).min(1.0);
            score += 0.25 * grade_fit * 100.0;
            reasons.push("온보딩 등급이 미션 요구 등급과 잘 맞습니다.".into());
        }

        // Engagement fit, 20%; ratio capped at 2x.
        if profile.engagement_rate > 0.0 && req.min_engagement_rate > 0.0 {
            let ratio = profile.engagement_rate / req.min_engagement_rate.max(0.01);
            score += 0.20 * ratio.min(2.0) * 50.0;
            if profile.engagement_rate >= req.min_engagement_rate {
                reasons.push("참여율이 미션 요구 조건을 충족합니다.".into());
            }
        }

        // Category / tag fit, 20%.
        let mut category_fit: f64 = if req.allowed_categories.is_empty() {
            50.0
        } else if req.allowed_categories.contains(&category) {
            100.0
        } else {
            0.0
        };
        if !req.required_tags.is_empty() {
            let matched: Vec<&String> = onboarding
                .tags
                .iter()
                .filter(|t| req.required_tags.contains(t))
                .collect();
            if !matched.is_empty() {
                category_fit = category_fit.max(80.0);
                let joined = matched
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                reasons.push(format!(
                    "미션이 요구하는 태그/카테고리와 크리에이터 태그가 잘 맞습니다: {joined}"
                ));
            }
        }
        score += 0.20 * category_fit;

        // History fit, 15%.
        let history = (f64::from(profile.completed_missions) / 10.0).min(1.0) * 50.0
            + (profile.avg_quality_score / 100.0).min(1.0) * 50.0;
        score += 0.15 * history;

        // Availability, 10%.
        let availability = if profile.current_active_missions < 3 {
            100.0
        } else {
            50.0
        };
        score += 0.10 * availability;

        // Diversity bonus, 10%.
        let diversity = if !mission.mission_type.is_empty()
            && !profile.recent_mission_types.contains(&mission.mission_type)
        {
            100.0
        } else {
            0.0
        };
        score += 0.10 * diversity;

        // Risk penalties after weighting.
        if onboarding.risks.iter().any(|r| r == "high_reports") {
            score -= 20.0;
            reasons.push("최근 신고 이력이 많아 감점되었습니다.".into());
        }
        if onboarding.risks.iter().any(|r| r == "low_engagement")
            && matches!(mission.reward_type, RewardType::Performance | RewardType::Hybrid)
        {
            score -= 10.0;
            reasons.push("낮은 참여율 리스크로 성과 기반 미션에서 감점되었습니다.".into());
        }
        if onboarding.risks.iter().any(|r| r == "low_activity") {
            score -= 5.0;
            reasons.push("활동성이 낮아 일부 감점되었습니다.".into());
        }

        let score = (score.clamp(0.0, 100.0) * 10.0).round() / 10.0;
        (score, reasons)
    }
}

fn external_signals(youtube_insights: Option<&Value>) -> Value {
    let Some(insights) = youtube_insights else {
        return Value::Null;
    };
    let overview = insights.get("channel_overview");
    let channel = overview
        .and_then(|o| o.get("channel_info"))
        .and_then(|c| c.get("snippet"))
        .and_then(|s| s.get("title"))
        .cloned()
        .unwrap_or(Value::Null);
    let latest_video = overview
        .and_then(|o| o.get("recent_videos"))
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .cloned()
        .unwrap_or(Value::Null);
    json!({
        "youtube_channel": channel,
        "latest_video": latest_video,
    })
}
