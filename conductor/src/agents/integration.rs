//! Integration agent: thin external-API enrichment step after search.
//!
//! Consumes URLs / queries left in the run context and writes one field of
//! external results back. Real third-party adapters live outside the core.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::mcp::{McpIntegrationService, McpSpec};

pub struct IntegrationAgent {
    mcp: Arc<McpIntegrationService>,
}

impl IntegrationAgent {
    pub fn new(mcp: Arc<McpIntegrationService>) -> Self {
        Self { mcp }
    }

    /// Fetches external context for the URLs/query found in the run context.
    pub async fn execute(&self, context: &HashMap<String, Value>) -> HashMap<String, Value> {
        let urls: Vec<String> = context
            .get("integration_urls")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let query = context
            .get("integration_query")
            .and_then(Value::as_str)
            .map(String::from);

        if urls.is_empty() && query.is_none() {
            return HashMap::new();
        }

        let spec = McpSpec {
            search_query: query,
            urls,
            ..Default::default()
        };
        let enrichment = self.mcp.enrich_context(&spec, None).await;

        let mut out = HashMap::new();
        if let Some(snippets) = enrichment.external_snippets {
            out.insert("snippets".to_string(), json!(snippets));
        }
        if let Some(sources) = enrichment.external_sources {
            out.insert("sources".to_string(), json!(sources));
        }
        if !enrichment.tool_policy.is_empty() {
            out.insert("tool_policy".to_string(), json!(enrichment.tool_policy));
        }
        out
    }
}
