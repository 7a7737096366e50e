//! State graph substrate: nodes, edges, conditional routing, checkpointed
//! execution.

mod compile_error;
mod compiled;
mod node;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::{CompiledStateGraph, RunConfig};
pub use node::{Next, Node};
pub use state_graph::{ConditionalRouterFn, StateGraph, END, START};
