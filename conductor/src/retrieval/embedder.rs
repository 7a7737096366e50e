//! Embedding backends for vector search.
//!
//! `OpenAIEmbedder` speaks the `/v1/embeddings` wire; `HashEmbedder` is the
//! deterministic offline fallback so retrieval keeps working without an
//! embedding service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::AgentError;

/// Text-to-vector backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AgentError>;
}

/// Embeddings over an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAIEmbedder {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AgentError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| AgentError::Retrieval(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Retrieval(format!(
                "embedding error {status}: {body}"
            )));
        }
        let parsed: EmbeddingResponse = res
            .json()
            .await
            .map_err(|e| AgentError::Retrieval(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|r| r.embedding).collect())
    }
}

/// Deterministic 128-dim hash embedding. No semantics, but stable: identical
/// texts land on identical vectors, which is enough for tests and for the
/// keyword-dominant fallback mode.
pub struct HashEmbedder;

pub const HASH_EMBEDDING_DIM: usize = 128;

impl HashEmbedder {
    fn embed_one(text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(HASH_EMBEDDING_DIM);
        let mut block = 0u8;
        while out.len() < HASH_EMBEDDING_DIM {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update([block]);
            let digest = hasher.finalize();
            for byte in digest.iter() {
                out.push(f32::from(*byte) / 255.0);
                if out.len() == HASH_EMBEDDING_DIM {
                    break;
                }
            }
            block = block.wrapping_add(1);
        }
        out
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AgentError> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: hash embeddings are deterministic, 128-dim, and in [0,1].
    #[tokio::test]
    async fn hash_embedding_is_stable() {
        let e = HashEmbedder;
        let a = e.embed(&["hello world"]).await.unwrap();
        let b = e.embed(&["hello world"]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), HASH_EMBEDDING_DIM);
        assert!(a[0].iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn different_texts_differ() {
        let e = HashEmbedder;
        let out = e.embed(&["a", "b"]).await.unwrap();
        assert_ne!(out[0], out[1]);
    }
}
