//! Data collection agent: crawl or scrape external sources into items.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::{McpIntegrationService, McpSpec, SupadataSpec};

/// Collection request from the run context.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub crawl_url: Option<String>,
    #[serde(default)]
    pub crawl_limit: Option<u32>,
    #[serde(default)]
    pub search_query: Option<String>,
}

/// Collection outcome written back to state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CollectedData {
    pub collection_id: String,
    pub status: String,
    pub items: Vec<Value>,
    pub success_count: usize,
    pub error_count: usize,
}

pub struct DataCollectionAgent {
    mcp: Arc<McpIntegrationService>,
}

impl DataCollectionAgent {
    pub fn new(mcp: Arc<McpIntegrationService>) -> Self {
        Self { mcp }
    }

    pub async fn execute(&self, config: &CollectionConfig) -> CollectedData {
        let collection_id = format!("collection_{}", uuid::Uuid::new_v4());
        let mut items: Vec<Value> = Vec::new();
        let mut error_count = 0usize;

        if config.urls.is_empty() && config.crawl_url.is_none() && config.search_query.is_none() {
            return CollectedData {
                collection_id,
                status: "empty".to_string(),
                ..Default::default()
            };
        }

        if !config.urls.is_empty() || config.crawl_url.is_some() {
            let enrichment = self
                .mcp
                .enrich_context(
                    &McpSpec {
                        supadata: Some(SupadataSpec {
                            scrape_urls: config.urls.clone(),
                            crawl_url: config.crawl_url.clone(),
                            crawl_limit: config.crawl_limit,
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    None,
                )
                .await;
            match enrichment.supadata {
                Some(Value::Object(map)) => {
                    if let Some(Value::Array(scrapes)) = map.get("scrapes") {
                        items.extend(scrapes.iter().cloned());
                    }
                    if let Some(crawl) = map.get("crawl") {
                        items.push(crawl.clone());
                    }
                }
                _ => error_count += 1,
            }
        }

        if let Some(query) = &config.search_query {
            let enrichment = self
                .mcp
                .enrich_context(
                    &McpSpec {
                        search_query: Some(query.clone()),
                        ..Default::default()
                    },
                    None,
                )
                .await;
            match enrichment.external_snippets {
                Some(snippets) => items.extend(snippets.into_iter().map(Value::String)),
                None => error_count += 1,
            }
        }

        let success_count = items.len();
        CollectedData {
            collection_id,
            status: if success_count > 0 {
                "completed".to_string()
            } else {
                "failed".to_string()
            },
            items,
            success_count,
            error_count,
        }
    }
}
