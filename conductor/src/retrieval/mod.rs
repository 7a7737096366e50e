//! Retrieval engine: pluggable vector backend, keyword index, hybrid merge,
//! reranking, and per-query/per-embedding caches.
//!
//! Vector search falls back to keyword search whenever the backend is absent
//! or erroring, so retrieval degrades instead of failing.

pub mod embedder;
pub mod rerank;
pub mod vector_store;

pub use embedder::{Embedder, HashEmbedder, OpenAIEmbedder};
pub use rerank::{CrossEncoder, LexicalCrossEncoder};
pub use vector_store::{InMemoryVectorStore, PineconeStore, VectorMatch, VectorRecord, VectorStore};

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RetrievalConfig;
use crate::error::AgentError;

/// Which search produced a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Vector,
    Keyword,
    Hybrid,
    VectorPinecone,
}

/// One retrieved document with scoring provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    /// Current ranking score in [0,1].
    pub score: f64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub search_type: SearchType,
    #[serde(default)]
    pub vector_score: f64,
    #[serde(default)]
    pub keyword_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
}

impl RetrievedDocument {
    pub fn ranking_score(&self) -> f64 {
        self.final_score.unwrap_or(self.score)
    }
}

/// Document handed to `add_documents`.
#[derive(Clone, Debug)]
pub struct DocumentInput {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
}

#[derive(Clone, Debug)]
struct IndexedDocument {
    content: String,
    metadata: HashMap<String, Value>,
}

/// Snapshot of the engine for status endpoints.
#[derive(Clone, Debug, Serialize)]
pub struct SearchStats {
    pub total_documents: usize,
    pub vector_store_available: bool,
    pub reranker_available: bool,
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub max_results: usize,
    pub similarity_threshold: f64,
}

fn sort_desc(docs: &mut [RetrievedDocument]) {
    docs.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Hybrid retrieval engine.
///
/// **Interaction**: shared (`Arc`) between the RAG pipeline and the creator
/// agent's enhancement lookups. Process-wide keyword index and caches live
/// inside; `clear_caches` is the test lifecycle hook.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    vector_store: Option<Arc<dyn VectorStore>>,
    vector_backend: String,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn CrossEncoder>>,
    keyword_index: DashMap<String, IndexedDocument>,
    query_cache: DashMap<String, Vec<RetrievedDocument>>,
    embedding_cache: DashMap<String, Vec<f32>>,
}

impl RetrievalEngine {
    pub fn new(config: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            vector_store: None,
            vector_backend: String::new(),
            embedder,
            reranker: None,
            keyword_index: DashMap::new(),
            query_cache: DashMap::new(),
            embedding_cache: DashMap::new(),
        }
    }

    pub fn with_vector_store(
        mut self,
        store: Arc<dyn VectorStore>,
        backend_name: impl Into<String>,
    ) -> Self {
        self.vector_store = Some(store);
        self.vector_backend = backend_name.into();
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn CrossEncoder>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Drops query and embedding caches. Test lifecycle.
    pub fn clear_caches(&self) {
        self.query_cache.clear();
        self.embedding_cache.clear();
    }

    async fn embedding_for(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        if let Some(hit) = self.embedding_cache.get(text) {
            return Ok(hit.value().clone());
        }
        let mut vectors = self.embedder.embed(&[text]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| AgentError::Retrieval("no embedding returned".to_string()))?;
        self.embedding_cache.insert(text.to_string(), vector.clone());
        Ok(vector)
    }

    fn vector_search_type(&self) -> SearchType {
        if self.vector_backend == "pinecone" {
            SearchType::VectorPinecone
        } else {
            SearchType::Vector
        }
    }

    /// Vector search against the backend; keyword search when the backend is
    /// missing or failing.
    pub async fn vector_search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&Value>,
    ) -> Vec<RetrievedDocument> {
        let cache_key = format!(
            "vec::{query}::{limit}::{}",
            filter.map(|f| f.to_string()).unwrap_or_default()
        );
        if let Some(hit) = self.query_cache.get(&cache_key) {
            return hit.value().clone();
        }

        let Some(store) = &self.vector_store else {
            return self.keyword_search(query, limit).await;
        };

        let results = match self.embedding_for(query).await {
            Ok(vector) => match store.query(&vector, limit, filter).await {
                Ok(matches) => matches
                    .into_iter()
                    .map(|m| {
                        let content = m
                            .metadata
                            .get("content")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        RetrievedDocument {
                            id: m.id,
                            content,
                            score: m.score.clamp(0.0, 1.0),
                            metadata: m.metadata,
                            search_type: self.vector_search_type(),
                            vector_score: m.score.clamp(0.0, 1.0),
                            keyword_score: 0.0,
                            rerank_score: None,
                            final_score: None,
                        }
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "vector search failed, falling back to keyword");
                    return self.keyword_search(query, limit).await;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, falling back to keyword");
                return self.keyword_search(query, limit).await;
            }
        };

        self.query_cache.insert(cache_key, Vec::clone(&results));
        results
    }

    /// Normalized term-count search over the in-memory keyword index.
    pub async fn keyword_search(&self, query: &str, limit: usize) -> Vec<RetrievedDocument> {
        let cache_key = format!("kw::{query}::{limit}");
        if let Some(hit) = self.query_cache.get(&cache_key) {
            return hit.value().clone();
        }

        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        let mut results: Vec<RetrievedDocument> = Vec::new();
        for entry in self.keyword_index.iter() {
            let content_lower = entry.value().content.to_lowercase();
            let hits: usize = terms
                .iter()
                .map(|t| content_lower.matches(t.as_str()).count())
                .sum();
            if hits == 0 {
                continue;
            }
            let word_count = content_lower.split_whitespace().count().max(1);
            let score = (hits as f64 / word_count as f64).min(1.0);
            results.push(RetrievedDocument {
                id: entry.key().clone(),
                content: entry.value().content.clone(),
                score,
                metadata: entry.value().metadata.clone(),
                search_type: SearchType::Keyword,
                vector_score: 0.0,
                keyword_score: score,
                rerank_score: None,
                final_score: None,
            });
        }
        sort_desc(&mut results);
        results.truncate(limit);
        self.query_cache.insert(cache_key, Vec::clone(&results));
        results
    }

    /// Vector and keyword searches run concurrently; results are merged per
    /// doc id with the configured weights.
    pub async fn hybrid_search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&Value>,
    ) -> Vec<RetrievedDocument> {
        let (vector_results, keyword_results) = tokio::join!(
            self.vector_search(query, limit, filter),
            self.keyword_search(query, limit)
        );

        let mut merged: HashMap<String, RetrievedDocument> = HashMap::new();
        for mut doc in vector_results {
            doc.vector_score = doc.score;
            doc.keyword_score = 0.0;
            merged.insert(doc.id.clone(), doc);
        }
        for doc in keyword_results {
            match merged.get_mut(&doc.id) {
                Some(existing) => existing.keyword_score = doc.score,
                None => {
                    let mut doc = doc;
                    doc.vector_score = 0.0;
                    doc.keyword_score = doc.score;
                    merged.insert(doc.id.clone(), doc);
                }
            }
        }

        let mut results: Vec<RetrievedDocument> = merged
            .into_values()
            .map(|mut doc| {
                doc.score = (doc.vector_score * self.config.vector_weight
                    + doc.keyword_score * self.config.keyword_weight)
                    .clamp(0.0, 1.0);
                doc.search_type = SearchType::Hybrid;
                doc
            })
            .collect();
        sort_desc(&mut results);
        results.truncate(limit);
        results
    }

    /// Cross-encoder rerank: `final = mean(base, rerank)` plus a small boost
    /// when a leading query token appears in the content, threshold filter,
    /// top_k cut.
    pub async fn rerank_documents(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>,
        top_k: usize,
    ) -> Vec<RetrievedDocument> {
        let threshold = self.config.reranker_threshold;
        let reranker = match &self.reranker {
            Some(r) if documents.len() > top_k => r,
            _ => {
                let mut docs = documents;
                docs.truncate(top_k);
                return docs
                    .into_iter()
                    .filter(|d| d.score >= threshold)
                    .collect();
            }
        };

        let contents: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let scores = match reranker.score(query, &contents).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "rerank failed, keeping hybrid order");
                let mut docs = documents;
                docs.truncate(top_k);
                return docs;
            }
        };

        let boost_terms: Vec<String> = if self.config.query_expansion_enabled {
            query
                .split_whitespace()
                .filter(|t| t.len() > 2)
                .take(3)
                .map(|t| t.to_lowercase())
                .collect()
        } else {
            Vec::new()
        };

        let mut reranked: Vec<RetrievedDocument> = documents
            .into_iter()
            .zip(scores)
            .filter_map(|(mut doc, rerank)| {
                let mut final_score = (doc.score + rerank) / 2.0;
                if !boost_terms.is_empty() {
                    let content_lower = doc.content.to_lowercase();
                    if boost_terms.iter().any(|t| content_lower.contains(t)) {
                        final_score = (final_score + 0.05).min(1.0);
                    }
                }
                if final_score < threshold {
                    return None;
                }
                doc.rerank_score = Some(rerank);
                doc.final_score = Some(final_score.clamp(0.0, 1.0));
                Some(doc)
            })
            .collect();
        sort_desc(&mut reranked);
        reranked.truncate(top_k);
        reranked
    }

    /// Indexes documents: keyword index always, vector backend when present.
    pub async fn add_documents(&self, documents: Vec<DocumentInput>) -> Result<(), AgentError> {
        let mut records = Vec::with_capacity(documents.len());
        for doc in &documents {
            self.keyword_index.insert(
                doc.id.clone(),
                IndexedDocument {
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                },
            );
        }
        if let Some(store) = &self.vector_store {
            for doc in &documents {
                let vector = self.embedding_for(&doc.content).await?;
                let mut metadata = doc.metadata.clone();
                metadata.insert("content".to_string(), Value::String(doc.content.clone()));
                metadata.insert(
                    "timestamp".to_string(),
                    Value::String(chrono::Utc::now().to_rfc3339()),
                );
                records.push(VectorRecord {
                    id: doc.id.clone(),
                    vector,
                    metadata,
                });
            }
            store.upsert(records).await?;
        }
        self.query_cache.clear();
        tracing::info!(count = documents.len(), "documents added to search index");
        Ok(())
    }

    pub async fn delete_documents(&self, ids: &[String]) -> Result<(), AgentError> {
        for id in ids {
            self.keyword_index.remove(id);
        }
        if let Some(store) = &self.vector_store {
            store.delete(ids).await?;
        }
        self.query_cache.clear();
        Ok(())
    }

    pub fn search_stats(&self) -> SearchStats {
        SearchStats {
            total_documents: self.keyword_index.len(),
            vector_store_available: self.vector_store.is_some(),
            reranker_available: self.reranker.is_some(),
            vector_weight: self.config.vector_weight,
            keyword_weight: self.config.keyword_weight,
            max_results: self.config.max_results,
            similarity_threshold: self.config.similarity_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> DocumentInput {
        DocumentInput {
            id: id.to_string(),
            content: content.to_string(),
            metadata: HashMap::new(),
        }
    }

    fn engine_with_store() -> RetrievalEngine {
        RetrievalEngine::new(RetrievalConfig::default(), Arc::new(HashEmbedder))
            .with_vector_store(Arc::new(InMemoryVectorStore::new()), "memory")
    }

    /// **Scenario**: keyword search normalizes term counts, orders
    /// non-increasing, and respects the limit.
    #[tokio::test]
    async fn keyword_search_orders_and_limits() {
        let engine = engine_with_store();
        engine
            .add_documents(vec![
                doc("a", "creator mission mission mission"),
                doc("b", "creator profile page"),
                doc("c", "totally unrelated"),
            ])
            .await
            .unwrap();
        let out = engine.keyword_search("mission", 2).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
        assert!(out[0].score <= 1.0 && out[0].score > 0.0);

        let all = engine.keyword_search("creator", 1).await;
        assert_eq!(all.len(), 1);
    }

    /// **Scenario**: hybrid merge resolves duplicates by id and weights
    /// vector vs keyword 0.7/0.3.
    #[tokio::test]
    async fn hybrid_merges_by_id() {
        let engine = engine_with_store();
        engine
            .add_documents(vec![doc("a", "mission guide"), doc("b", "mission rules")])
            .await
            .unwrap();
        let out = engine.hybrid_search("mission guide", 10, None).await;
        let ids: Vec<&str> = out.iter().map(|d| d.id.as_str()).collect();
        // Each id appears once even though both searches returned it.
        assert_eq!(ids.iter().filter(|i| **i == "a").count(), 1);
        for d in &out {
            assert!(d.score >= 0.0 && d.score <= 1.0);
            assert_eq!(d.search_type, SearchType::Hybrid);
        }
        // Non-increasing order.
        for pair in out.windows(2) {
            assert!(pair[0].ranking_score() >= pair[1].ranking_score());
        }
    }

    /// **Scenario**: rerank keeps at most top_k and attaches final scores
    /// when the cross-encoder runs.
    #[tokio::test]
    async fn rerank_truncates_to_top_k() {
        let engine = RetrievalEngine::new(RetrievalConfig::default(), Arc::new(HashEmbedder))
            .with_reranker(Arc::new(LexicalCrossEncoder));
        let docs: Vec<RetrievedDocument> = (0..5)
            .map(|i| RetrievedDocument {
                id: format!("d{i}"),
                content: if i == 0 {
                    "mission creator guide".to_string()
                } else {
                    format!("filler document {i}")
                },
                score: 0.5,
                metadata: HashMap::new(),
                search_type: SearchType::Hybrid,
                vector_score: 0.5,
                keyword_score: 0.0,
                rerank_score: None,
                final_score: None,
            })
            .collect();
        let out = engine.rerank_documents("mission creator guide", docs, 3).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].id, "d0");
        assert!(out[0].final_score.unwrap() > out[1].final_score.unwrap());
    }

    /// **Scenario**: without a vector store, vector search degrades to
    /// keyword search instead of failing.
    #[tokio::test]
    async fn vector_search_falls_back_without_store() {
        let engine = RetrievalEngine::new(RetrievalConfig::default(), Arc::new(HashEmbedder));
        engine
            .add_documents(vec![doc("a", "fallback content")])
            .await
            .unwrap();
        let out = engine.vector_search("fallback", 5, None).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].search_type, SearchType::Keyword);
    }

    /// **Scenario**: repeated identical queries hit the query cache (results
    /// are stable even after index mutation without cache clear).
    #[tokio::test]
    async fn query_cache_serves_repeat_queries() {
        let engine = engine_with_store();
        engine.add_documents(vec![doc("a", "cached text")]).await.unwrap();
        let first = engine.keyword_search("cached", 5).await;
        assert_eq!(first.len(), 1);
        // Mutate the index behind the cache's back.
        engine.keyword_index.remove("a");
        let second = engine.keyword_search("cached", 5).await;
        assert_eq!(second.len(), 1);
        engine.clear_caches();
        let third = engine.keyword_search("cached", 5).await;
        assert!(third.is_empty());
    }
}
