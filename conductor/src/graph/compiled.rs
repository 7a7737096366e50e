//! Executable graph: the invoke loop with per-node checkpointing.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AgentError;
use crate::graph::node::{Next, Node};
use crate::graph::state_graph::{ConditionalRouter, END};
use crate::memory::Checkpointer;

/// Backstop against wiring mistakes; the orchestrator's own loop budget is
/// the functional bound.
const MAX_STEPS: usize = 64;

/// Per-run configuration. A thread id enables checkpointing.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    pub thread_id: Option<String>,
}

impl RunConfig {
    pub fn with_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
        }
    }
}

pub(crate) enum NextEntry<S> {
    Unconditional(String),
    Conditional(ConditionalRouter<S>),
}

/// Compiled, immutable graph ready for `invoke`.
pub struct CompiledStateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    first_node_id: String,
    next_map: HashMap<String, NextEntry<S>>,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
}

impl<S> Debug for CompiledStateGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStateGraph")
            .field("first_node_id", &self.first_node_id)
            .field("node_count", &self.nodes.len())
            .finish()
    }
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + Serialize + DeserializeOwned + 'static,
{
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        first_node_id: String,
        next_map: HashMap<String, NextEntry<S>>,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    ) -> Self {
        Self {
            nodes,
            first_node_id,
            next_map,
            checkpointer,
        }
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer<S>>> {
        self.checkpointer.as_ref()
    }

    async fn checkpoint(&self, config: &RunConfig, state: &S) {
        let (Some(saver), Some(thread_id)) = (&self.checkpointer, &config.thread_id) else {
            return;
        };
        if let Err(e) = saver.put(thread_id, state).await {
            tracing::warn!(thread_id, error = %e, "checkpoint write failed");
        }
    }

    /// Runs the graph to END. The state after node N is visible to node N+1;
    /// each advance is checkpointed when a thread id is configured.
    pub async fn invoke(&self, state: S, config: &RunConfig) -> Result<S, AgentError> {
        let mut state = state;
        let mut current = self.first_node_id.clone();
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > MAX_STEPS {
                return Err(AgentError::State(format!(
                    "graph exceeded {MAX_STEPS} steps at node {current}"
                )));
            }
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| AgentError::State(format!("unknown node: {current}")))?;
            tracing::debug!(node = %current, "graph node start");
            let (new_state, next) = node.run(state).await?;
            state = new_state;
            self.checkpoint(config, &state).await;
            tracing::debug!(node = %current, "graph node complete");

            let target = match next {
                Next::End => break,
                Next::Node(id) => id,
                Next::Continue => match self.next_map.get(&current) {
                    Some(NextEntry::Unconditional(to)) => to.clone(),
                    Some(NextEntry::Conditional(router)) => {
                        let key = (router.path)(&state);
                        match &router.path_map {
                            Some(map) => map.get(&key).cloned().unwrap_or(key),
                            None => key,
                        }
                    }
                    None => break,
                },
            };
            if target == END {
                break;
            }
            current = target;
        }
        Ok(state)
    }
}
