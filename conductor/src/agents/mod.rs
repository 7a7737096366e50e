//! Domain agents: creator onboarding, mission matching, analytics,
//! competency, recommendation, search, integration, data collection, and the
//! deep-agents loop.

pub mod analytics;
pub mod competency;
pub mod creator;
pub mod data_collection;
pub mod deep;
pub mod integration;
pub mod mission;
pub mod recommendation;
pub mod search;

pub use analytics::{AnalyticsAgent, AnalyticsReport, MetricsProvider, ReportType, SampleMetricsProvider};
pub use competency::{CompetencyAgent, CompetencyAssessment, CompetencyResponse};
pub use creator::{
    CreatorEvaluationInput, CreatorEvaluationResult, CreatorMetrics, CreatorOnboardingAgent,
    Decision, Grade, RagEnhancedData, ScoreBreakdown,
};
pub use data_collection::{CollectedData, CollectionConfig, DataCollectionAgent};
pub use deep::{DeepAgents, DeepAgentsOutcome};
pub use integration::IntegrationAgent;
pub use mission::{
    Mission, MissionAgent, MissionAssignment, MissionAssignmentStatus, MissionCandidateProfile,
    MissionFilters, MissionRequirement, OnboardingSummary, RewardType,
};
pub use recommendation::{RecommendationAgent, RecommendationData, RecommendationItem};
pub use search::SearchAgent;
