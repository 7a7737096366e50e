//! Multi-query expansion for recall.
//!
//! The fast model paraphrases the user query; the original query always
//! leads the list and duplicates are dropped. Expansion failure degrades to
//! the original query alone.

use std::sync::Arc;

use crate::llm::{GenerateOptions, GenerationEngine};

pub struct QueryExpander {
    engine: Arc<GenerationEngine>,
}

impl QueryExpander {
    pub fn new(engine: Arc<GenerationEngine>) -> Self {
        Self { engine }
    }

    /// Expands the query into at most `n_variations + 1` search queries.
    pub async fn expand(&self, original: &str, n_variations: usize) -> Vec<String> {
        if !self.engine.has_models() || n_variations == 0 {
            return vec![original.to_string()];
        }
        let system_prompt = format!(
            "You are a Query Expander for an AI search engine.\n\
             Generate {n_variations} alternative search queries for the user input,\n\
             covering synonyms and related terms to maximize recall.\n\
             Output format: just the queries, one per line. No numbering, no prefixes.\n\
             User Input: \"{original}\""
        );
        let opts = GenerateOptions {
            system_prompt: Some(system_prompt),
            model_name: Some(self.engine.fast_model().to_string()),
            ..Default::default()
        };
        let response = self
            .engine
            .generate(&format!("Generate {n_variations} variations."), &opts)
            .await;

        let mut queries = vec![original.to_string()];
        for line in response.lines() {
            let candidate = line.trim();
            if candidate.is_empty() {
                continue;
            }
            if queries.iter().any(|q| q == candidate) {
                continue;
            }
            queries.push(candidate.to_string());
            if queries.len() == n_variations + 1 {
                break;
            }
        }
        queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::llm::MockLlm;

    fn engine(responses: Vec<String>) -> Arc<GenerationEngine> {
        let mut e = GenerationEngine::from_settings(&Settings::default());
        e.register_model(Arc::new(MockLlm::new("gemini-2.0-flash", responses)));
        Arc::new(e)
    }

    /// **Scenario**: original query is always first and unique; list is
    /// capped at n_variations + 1.
    #[tokio::test]
    async fn original_first_and_deduped() {
        let expander = QueryExpander::new(engine(vec![
            "variant one\noriginal query\nvariant two\nvariant three\nvariant four".into(),
        ]));
        let out = expander.expand("original query", 3).await;
        assert_eq!(out[0], "original query");
        assert_eq!(out.len(), 4);
        assert!(!out[1..].contains(&"original query".to_string()));
    }

    /// **Scenario**: with no usable model, expansion degrades to the original
    /// query alone.
    #[tokio::test]
    async fn degrades_without_models() {
        let e = Arc::new(GenerationEngine::from_settings(&Settings::default()));
        let expander = QueryExpander::new(e);
        assert_eq!(expander.expand("q", 3).await, vec!["q".to_string()]);
    }
}
