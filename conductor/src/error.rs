//! Crate-wide error type for agents, nodes, LLM calls and tools.
//!
//! Nodes convert these into entries on `OrchestratorState::errors`; the
//! orchestrator itself never lets one escape a run.

/// Error raised by agents, graph nodes, LLM clients and tool calls.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("llm error: {0}")]
    Llm(String),
    #[error("tool error: {0}")]
    Tool(String),
    #[error("retrieval error: {0}")]
    Retrieval(String),
    #[error("timeout after {0} ms")]
    Timeout(u64),
    #[error("circuit_open")]
    CircuitOpen,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("state error: {0}")]
    State(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AgentError {
    /// True when this failure was a breaker short-circuit rather than a real
    /// downstream error. Skipped calls must not count as breaker failures.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, AgentError::CircuitOpen)
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Tool(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each variant contains its keyword so error
    /// strings recorded on state stay greppable.
    #[test]
    fn display_keeps_variant_keywords() {
        assert!(AgentError::Llm("x".into()).to_string().contains("llm"));
        assert!(AgentError::Tool("x".into()).to_string().contains("tool"));
        assert!(AgentError::CircuitOpen.to_string().contains("circuit_open"));
        assert!(AgentError::Timeout(8000).to_string().contains("8000"));
    }

    #[test]
    fn circuit_open_is_flagged() {
        assert!(AgentError::CircuitOpen.is_circuit_open());
        assert!(!AgentError::Tool("x".into()).is_circuit_open());
    }
}
