//! Vector store contract and backends.
//!
//! The wire is small: query by vector, upsert, delete. `PineconeStore` is the
//! primary backend; `InMemoryVectorStore` (cosine over a DashMap) backs tests
//! and LLM-less deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AgentError;

/// One stored vector with its metadata.
#[derive(Clone, Debug)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, Value>,
}

/// One query match.
#[derive(Clone, Debug)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub metadata: HashMap<String, Value>,
}

/// Vector store wire: `query(vector, top_k, filter)`, `upsert`, `delete`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<VectorMatch>, AgentError>;

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), AgentError>;

    async fn delete(&self, ids: &[String]) -> Result<(), AgentError>;
}

/// Pinecone data-plane client (index host URL, namespace-scoped).
pub struct PineconeStore {
    api_key: String,
    index_host: String,
    namespace: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PineconeQueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    #[serde(default)]
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<HashMap<String, Value>>,
}

impl PineconeStore {
    pub fn new(
        api_key: impl Into<String>,
        index_host: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            index_host: index_host.into(),
            namespace: namespace.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.index_host.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<reqwest::Response, AgentError> {
        let res = self
            .client
            .post(self.url(path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Retrieval(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(AgentError::Retrieval(format!(
                "pinecone error {status}: {text}"
            )));
        }
        Ok(res)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<VectorMatch>, AgentError> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "namespace": self.namespace,
            "includeMetadata": true,
        });
        if let (Some(f), Some(obj)) = (filter, body.as_object_mut()) {
            if f.as_object().map(|m| !m.is_empty()).unwrap_or(false) {
                obj.insert("filter".to_string(), f.clone());
            }
        }
        let res = self.post("/query", body).await?;
        let parsed: PineconeQueryResponse = res
            .json()
            .await
            .map_err(|e| AgentError::Retrieval(e.to_string()))?;
        Ok(parsed
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), AgentError> {
        let vectors: Vec<Value> = records
            .into_iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "values": r.vector,
                    "metadata": r.metadata,
                })
            })
            .collect();
        self.post(
            "/vectors/upsert",
            json!({ "vectors": vectors, "namespace": self.namespace }),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), AgentError> {
        self.post(
            "/vectors/delete",
            json!({ "ids": ids, "namespace": self.namespace }),
        )
        .await?;
        Ok(())
    }
}

/// In-memory cosine-similarity store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: DashMap<String, VectorRecord>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            f64::from(dot / (norm_a * norm_b))
        }
    }

    fn matches_filter(metadata: &HashMap<String, Value>, filter: Option<&Value>) -> bool {
        let Some(Value::Object(map)) = filter else {
            return true;
        };
        map.iter()
            .all(|(k, v)| metadata.get(k).map(|m| m == v).unwrap_or(false))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<VectorMatch>, AgentError> {
        let mut scored: Vec<VectorMatch> = self
            .records
            .iter()
            .filter(|e| Self::matches_filter(&e.value().metadata, filter))
            .map(|e| VectorMatch {
                id: e.value().id.clone(),
                score: Self::cosine_similarity(vector, &e.value().vector).clamp(0.0, 1.0),
                metadata: e.value().metadata.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), AgentError> {
        for r in records {
            self.records.insert(r.id.clone(), r);
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), AgentError> {
        for id in ids {
            self.records.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata: HashMap::new(),
        }
    }

    /// **Scenario**: cosine ranking orders the closer vector first and
    /// respects top_k.
    #[tokio::test]
    async fn in_memory_query_ranks_by_cosine() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                record("near", vec![1.0, 0.0]),
                record("far", vec![0.0, 1.0]),
                record("mid", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();
        let out = store.query(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "near");
        assert!(out[0].score >= out[1].score);
    }

    /// **Scenario**: metadata equality filter excludes non-matching records.
    #[tokio::test]
    async fn in_memory_filter_applies() {
        let store = InMemoryVectorStore::new();
        let mut tagged = record("tagged", vec![1.0]);
        tagged
            .metadata
            .insert("category".to_string(), json!("policy"));
        store
            .upsert(vec![tagged, record("plain", vec![1.0])])
            .await
            .unwrap();
        let out = store
            .query(&[1.0], 10, Some(&json!({"category": "policy"})))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "tagged");
    }

    #[tokio::test]
    async fn in_memory_delete_removes() {
        let store = InMemoryVectorStore::new();
        store.upsert(vec![record("a", vec![1.0])]).await.unwrap();
        store.delete(&["a".to_string()]).await.unwrap();
        assert!(store.query(&[1.0], 5, None).await.unwrap().is_empty());
    }
}
