//! # Conductor
//!
//! Compound AI orchestration core for a creator-onboarding / mission-
//! recommendation platform: a deterministic, loop-bounded orchestrator graph
//! that routes, plans, and executes multi-stage natural-language requests.
//!
//! ## Design principles
//!
//! - **Single state type**: one [`OrchestratorState`] flows through every
//!   graph node; nodes mutate their own output field plus the shared
//!   envelope (messages, audit trail, errors, loop budget) and pass the rest
//!   through untouched.
//! - **No escaping failures**: nodes record errors on the state and the run
//!   continues; the final synthesizer always produces a user-visible answer.
//! - **Bounded corrective loops**: replan and RAG re-entry each consume one
//!   unit of `loop_count`, capped by `max_loops`.
//! - **Guarded external calls**: every tool call runs under a named circuit
//!   breaker with per-tool timeout and jittered retries.
//!
//! ## Main modules
//!
//! - [`orchestrator`]: the state machine ([`Orchestrator`],
//!   [`OrchestratorState`], router, planner, nodes).
//! - [`graph`]: [`StateGraph`], [`CompiledStateGraph`], [`Node`], [`Next`] —
//!   build and run checkpointed state graphs.
//! - [`rag`]: [`RagPipeline`] — cache, expansion, hybrid retrieval, rerank,
//!   context build, generation, refinement.
//! - [`retrieval`]: [`RetrievalEngine`], vector stores, embedders, rerankers.
//! - [`llm`]: [`LlmClient`], [`ChatOpenAI`], [`MockLlm`],
//!   [`GenerationEngine`] with slots and fallback cascade.
//! - [`mcp`]: tool specs, sanitization, clients and
//!   [`McpIntegrationService`].
//! - [`agents`]: creator scoring, mission matching, analytics, competency,
//!   recommendation, search, integration, data collection, deep agents.
//! - [`breaker`]: [`CircuitBreaker`] and the process-wide manager.
//! - [`memory`]: [`Checkpointer`], [`MemorySaver`], [`SqliteSaver`].
//! - [`metrics`]: the process-wide metrics sink.
//! - [`config`]: [`Settings`] and per-agent runtime configs.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conductor::config::Settings;
//! use conductor::llm::GenerationEngine;
//! use conductor::mcp::McpIntegrationService;
//! use conductor::memory::MemorySaver;
//! use conductor::orchestrator::{Orchestrator, OrchestratorRequest, OrchestratorState};
//! use conductor::retrieval::{HashEmbedder, RetrievalEngine};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let settings = Settings::from_env();
//! let retrieval = Arc::new(RetrievalEngine::new(
//!     settings.retrieval.clone(),
//!     Arc::new(HashEmbedder),
//! ));
//! let generation = Arc::new(GenerationEngine::from_settings(&settings));
//! let mcp = Arc::new(McpIntegrationService::from_settings(&settings));
//! let saver: Arc<MemorySaver<OrchestratorState>> = Arc::new(MemorySaver::new());
//! let orchestrator = Orchestrator::new(&settings, generation, retrieval, mcp, saver)
//!     .expect("graph wiring is static");
//!
//! let response = orchestrator
//!     .run(OrchestratorRequest::new("크리에이터 등급 정책 알려주세요"))
//!     .await;
//! println!("{}", response.response.unwrap_or_default());
//! # }
//! ```

pub mod agents;
pub mod breaker;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod rag;
pub mod retrieval;

pub use agents::{
    CreatorEvaluationInput, CreatorEvaluationResult, CreatorOnboardingAgent, Decision, Grade,
    Mission, MissionAgent, MissionAssignment, MissionRequirement,
};
pub use breaker::{circuit_breaker_manager, CircuitBreaker, CircuitBreakerManager, CircuitState};
pub use config::{agent_runtime_config, AgentConfig, Settings, ToolPolicy};
pub use error::AgentError;
pub use graph::{
    CompilationError, CompiledStateGraph, Next, Node, RunConfig, StateGraph, END, START,
};
pub use llm::{ChatOpenAI, GenerationEngine, LlmClient, LlmResponse, MockLlm};
pub use mcp::{sanitize_spec, McpIntegrationService, McpSpec, ToolExecutionRecord};
pub use memory::{CheckpointError, Checkpointer, MemorySaver, SqliteSaver};
pub use message::Message;
pub use metrics::{metrics_collector, MetricsCollector, MetricsSnapshot};
pub use orchestrator::{
    Orchestrator, OrchestratorRequest, OrchestratorResponse, OrchestratorState, WorkflowType,
};
pub use rag::{QueryType, RagOutcome, RagPipeline, SemanticCache};
pub use retrieval::{RetrievalEngine, RetrievedDocument, SearchType};
