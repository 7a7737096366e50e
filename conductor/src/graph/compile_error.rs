//! Graph compilation errors.

/// Raised by `StateGraph::compile` when the wiring is invalid.
#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("no edge from START")]
    MissingStart,
    #[error("no edge to END")]
    MissingEnd,
    #[error("invalid chain: {0}")]
    InvalidChain(String),
    #[error("conditional path map references unknown node: {0}")]
    InvalidConditionalPathMap(String),
    #[error("node has both an edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each variant carries its identifying text.
    #[test]
    fn display_variants() {
        assert!(CompilationError::NodeNotFound("x".into())
            .to_string()
            .contains("x"));
        assert!(CompilationError::MissingStart.to_string().contains("START"));
        assert!(CompilationError::MissingEnd.to_string().contains("END"));
        assert!(CompilationError::NodeHasBothEdgeAndConditional("a".into())
            .to_string()
            .contains("both"));
    }
}
