//! SQLite-backed checkpointer. Persistent across process restarts.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{CheckpointError, Checkpointer};

/// One row per thread: whole-state JSON payload, replaced on every put.
///
/// Uses spawn_blocking for the rusqlite calls. Single-node and dev scale.
pub struct SqliteSaver<S> {
    db_path: PathBuf,
    _state: PhantomData<fn() -> S>,
}

impl<S> SqliteSaver<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Opens (and initializes) the checkpoint database.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                ts TEXT NOT NULL,
                payload BLOB NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            _state: PhantomData,
        })
    }

    fn require_thread_id(thread_id: &str) -> Result<String, CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        Ok(thread_id.to_string())
    }
}

#[async_trait]
impl<S> Checkpointer<S> for SqliteSaver<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn put(&self, thread_id: &str, state: &S) -> Result<(), CheckpointError> {
        let thread_id = Self::require_thread_id(thread_id)?;
        let payload =
            serde_json::to_vec(state).map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let ts = chrono::Utc::now().to_rfc3339();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (thread_id, ts, payload) VALUES (?1, ?2, ?3)",
                params![thread_id, ts, payload],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    async fn get(&self, thread_id: &str) -> Result<Option<S>, CheckpointError> {
        let thread_id = Self::require_thread_id(thread_id)?;
        let db_path = self.db_path.clone();
        let payload: Option<Vec<u8>> = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT payload FROM checkpoints WHERE thread_id = ?1")
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query(params![thread_id])
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let row = rows
                .next()
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            match row {
                Some(r) => {
                    let payload: Vec<u8> = r
                        .get(0)
                        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                    Ok::<Option<Vec<u8>>, CheckpointError>(Some(payload))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))??;

        match payload {
            Some(bytes) => {
                let state = serde_json::from_slice(&bytes)
                    .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let thread_id = Self::require_thread_id(thread_id)?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                "DELETE FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}
