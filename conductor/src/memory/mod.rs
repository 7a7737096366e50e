//! Checkpoint store: whole-state snapshots keyed by thread id.
//!
//! `put` persists, `get` loads the latest, `delete` clears a session. The
//! in-memory saver backs tests; the SQLite saver is the durable production
//! default.

mod memory_saver;
mod sqlite_saver;

pub use memory_saver::MemorySaver;
pub use sqlite_saver::SqliteSaver;

use async_trait::async_trait;

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("thread_id required")]
    ThreadIdRequired,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// Saves and loads whole-state checkpoints by thread id.
///
/// **Interaction**: injected at `StateGraph::compile_with_checkpointer`;
/// `CompiledStateGraph::invoke` writes after every node when the run config
/// carries a thread id. The orchestrator reads it back for resume.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    /// Persists the state snapshot for the thread, replacing any previous one.
    async fn put(&self, thread_id: &str, state: &S) -> Result<(), CheckpointError>;

    /// Loads the latest snapshot for the thread.
    async fn get(&self, thread_id: &str) -> Result<Option<S>, CheckpointError>;

    /// Deletes every row for the thread.
    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each CheckpointError variant contains its
    /// keyword.
    #[test]
    fn checkpoint_error_display() {
        assert!(CheckpointError::ThreadIdRequired
            .to_string()
            .contains("thread"));
        assert!(CheckpointError::Serialization("e".into())
            .to_string()
            .contains("serialization"));
        assert!(CheckpointError::Storage("io".into())
            .to_string()
            .contains("storage"));
    }
}
