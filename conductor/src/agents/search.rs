//! Search agent: thin wrapper over hybrid retrieval.

use std::sync::Arc;

use crate::retrieval::{RetrievalEngine, RetrievedDocument};

pub struct SearchAgent {
    retrieval: Arc<RetrievalEngine>,
    limit: usize,
}

impl SearchAgent {
    pub fn new(retrieval: Arc<RetrievalEngine>) -> Self {
        Self {
            retrieval,
            limit: 10,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub async fn execute(&self, query: &str) -> Vec<RetrievedDocument> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        self.retrieval.hybrid_search(query, self.limit, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::retrieval::{DocumentInput, HashEmbedder};
    use std::collections::HashMap;

    /// **Scenario**: blank queries return nothing; real queries hit the
    /// index.
    #[tokio::test]
    async fn blank_query_returns_empty() {
        let engine = Arc::new(RetrievalEngine::new(
            RetrievalConfig::default(),
            Arc::new(HashEmbedder),
        ));
        engine
            .add_documents(vec![DocumentInput {
                id: "d".into(),
                content: "미션 가이드".into(),
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();
        let agent = SearchAgent::new(engine);
        assert!(agent.execute("   ").await.is_empty());
        assert_eq!(agent.execute("미션").await.len(), 1);
    }
}
