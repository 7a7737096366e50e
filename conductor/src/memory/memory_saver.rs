//! In-memory checkpointer for tests and ephemeral sessions.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CheckpointError, Checkpointer};

/// Map-backed checkpointer. Snapshots live for the process lifetime.
pub struct MemorySaver<S> {
    states: DashMap<String, S>,
}

impl<S> Default for MemorySaver<S> {
    fn default() -> Self {
        Self {
            states: DashMap::new(),
        }
    }
}

impl<S> MemorySaver<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl<S> Checkpointer<S> for MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn put(&self, thread_id: &str, state: &S) -> Result<(), CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        self.states.insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<S>, CheckpointError> {
        Ok(self.states.get(thread_id).map(|s| s.value().clone()))
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        self.states.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: put/get round-trips the value; delete removes it.
    #[tokio::test]
    async fn round_trip_and_delete() {
        let saver: MemorySaver<String> = MemorySaver::new();
        saver.put("t1", &"state".to_string()).await.unwrap();
        assert_eq!(saver.get("t1").await.unwrap().as_deref(), Some("state"));
        saver.delete("t1").await.unwrap();
        assert_eq!(saver.get("t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_thread_id_rejected() {
        let saver: MemorySaver<String> = MemorySaver::new();
        assert!(matches!(
            saver.put("", &"x".to_string()).await,
            Err(CheckpointError::ThreadIdRequired)
        ));
    }
}
