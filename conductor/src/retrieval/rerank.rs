//! Cross-encoder reranking contract.
//!
//! A real cross-encoder scores (query, document) pairs jointly. The lexical
//! implementation is the model-free stand-in: token overlap ratio, which
//! keeps the rerank stage exercisable everywhere.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::AgentError;

/// Scores (query, document) pairs; higher is more relevant.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f64>, AgentError>;
}

/// Token-overlap reranker.
pub struct LexicalCrossEncoder;

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .map(String::from)
        .collect()
}

#[async_trait]
impl CrossEncoder for LexicalCrossEncoder {
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f64>, AgentError> {
        let query_tokens = tokens(query);
        if query_tokens.is_empty() {
            return Ok(vec![0.0; documents.len()]);
        }
        Ok(documents
            .iter()
            .map(|doc| {
                let doc_tokens = tokens(doc);
                let overlap = query_tokens.intersection(&doc_tokens).count();
                overlap as f64 / query_tokens.len() as f64
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a document repeating the query terms outranks an
    /// unrelated one; scores stay in [0,1].
    #[tokio::test]
    async fn overlap_orders_documents() {
        let encoder = LexicalCrossEncoder;
        let scores = encoder
            .score(
                "creator onboarding policy",
                &["creator onboarding policy guide", "unrelated text entirely"],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[tokio::test]
    async fn empty_query_scores_zero() {
        let encoder = LexicalCrossEncoder;
        let scores = encoder.score("", &["doc"]).await.unwrap();
        assert_eq!(scores, vec![0.0]);
    }
}
