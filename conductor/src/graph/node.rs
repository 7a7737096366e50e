//! Graph node trait: one step in a StateGraph.
//!
//! Receives state `S`, returns updated `S` and `Next` (continue, jump, or
//! end). The runner consults `Next` before edges, so a node can drive
//! loop-bounded corrective jumps itself.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::AgentError;

/// Routing decision returned by a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    /// Follow the graph's edge (or conditional router) for this node.
    Continue,
    /// Jump straight to the named node.
    Node(String),
    /// Stop the run.
    End,
}

/// One step in a graph: state in, (state out, next step).
///
/// **Interaction**: implemented by every orchestrator node; executed by
/// `CompiledStateGraph::invoke`, which checkpoints the state after each step.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Node id; unique within a graph.
    fn id(&self) -> &str;

    /// One step: state in, (state out, next step).
    async fn run(&self, state: S) -> Result<(S, Next), AgentError>;
}
