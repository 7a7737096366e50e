//! Cost/latency-aware model routing.
//!
//! Maps (user tier, complexity, task type, cost preference) to a model slot.
//! Routing/classification always lands on the fast slot; planning and high
//! complexity escalate to the deep slot when the tier or preference permits.

use serde::Serialize;

use super::GenerationEngine;

/// Outcome of a routing decision, applied to the generation context.
#[derive(Clone, Debug, Serialize)]
pub struct RoutingChoice {
    pub model_name: String,
    pub cost_hint: &'static str,
    pub latency_hint: &'static str,
}

/// Picks the model slot for a request.
pub fn route_request(
    engine: &GenerationEngine,
    user_tier: &str,
    complexity: &str,
    task_type: &str,
    cost_preference: &str,
) -> RoutingChoice {
    if task_type == "routing" {
        return RoutingChoice {
            model_name: engine.fast_model().to_string(),
            cost_hint: "budget",
            latency_hint: "fast",
        };
    }

    if (task_type == "planning" || complexity == "high")
        && (user_tier == "pro" || cost_preference == "performance")
    {
        return RoutingChoice {
            model_name: engine.deep_model().to_string(),
            cost_hint: "premium",
            latency_hint: "slow",
        };
    }

    if task_type == "coding" {
        return RoutingChoice {
            model_name: engine.deep_model().to_string(),
            cost_hint: "balanced",
            latency_hint: "normal",
        };
    }

    let mut choice = RoutingChoice {
        model_name: engine.default_model().to_string(),
        cost_hint: "balanced",
        latency_hint: "normal",
    };

    if task_type == "rag" && cost_preference == "budget" {
        choice.model_name = engine.fast_model().to_string();
        choice.cost_hint = "budget";
    }

    match user_tier {
        "free" => {
            choice.model_name = engine.fast_model().to_string();
            choice.cost_hint = "budget";
            choice.latency_hint = "fast";
        }
        "pro" if cost_preference == "speed" => {
            choice.model_name = engine.fast_model().to_string();
            choice.latency_hint = "fast";
        }
        _ => {}
    }

    tracing::info!(
        tier = user_tier,
        task = task_type,
        complexity,
        model = %choice.model_name,
        "routed request"
    );
    choice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn engine() -> GenerationEngine {
        GenerationEngine::from_settings(&Settings::default())
    }

    /// **Scenario**: routing task always lands on the fast slot.
    #[test]
    fn routing_uses_fast_slot() {
        let choice = route_request(&engine(), "pro", "simple", "routing", "balanced");
        assert_eq!(choice.model_name, "gemini-2.0-flash");
        assert_eq!(choice.latency_hint, "fast");
    }

    /// **Scenario**: high complexity on a pro tier escalates to the deep slot.
    #[test]
    fn high_complexity_pro_uses_deep() {
        let choice = route_request(&engine(), "pro", "high", "general", "balanced");
        assert_eq!(choice.model_name, "gpt-5.1");
        assert_eq!(choice.cost_hint, "premium");
    }

    /// **Scenario**: free tier is forced onto the fast slot even for RAG.
    #[test]
    fn free_tier_forced_fast() {
        let choice = route_request(&engine(), "free", "medium", "rag", "balanced");
        assert_eq!(choice.model_name, "gemini-2.0-flash");
        assert_eq!(choice.cost_hint, "budget");
    }

    /// **Scenario**: pro tier with speed preference picks the fast slot.
    #[test]
    fn pro_speed_prefers_fast() {
        let choice = route_request(&engine(), "pro", "simple", "general", "speed");
        assert_eq!(choice.model_name, "gemini-2.0-flash");
        assert_eq!(choice.latency_hint, "fast");
    }
}
