//! Process configuration and per-agent runtime configs.
//!
//! `Settings` is resolved once at startup (env with dotenv, or defaults for
//! tests) and treated as immutable afterwards. `agent_runtime_config` derives
//! the per-agent view: model preferences plus embedding/vector backends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Retry/breaker/timeout policy for one MCP tool family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolPolicy {
    pub fail_max: u32,
    pub reset_timeout_secs: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_secs: f64,
    pub backoff_max_secs: f64,
    pub jitter_secs: f64,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            fail_max: 3,
            reset_timeout_secs: 30,
            timeout_secs: 8,
            max_retries: 1,
            backoff_base_secs: 0.4,
            backoff_max_secs: 3.0,
            jitter_secs: 0.2,
        }
    }
}

/// Retrieval knobs consumed by `RetrievalEngine` and the RAG pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub max_results: usize,
    pub similarity_threshold: f64,
    pub rerank_top_k: usize,
    pub max_retrieval_docs: usize,
    pub reranker_threshold: f64,
    pub query_expansion_enabled: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            keyword_weight: 0.3,
            max_results: 10,
            similarity_threshold: 0.5,
            rerank_top_k: 3,
            max_retrieval_docs: 5,
            reranker_threshold: 0.0,
            query_expansion_enabled: true,
        }
    }
}

/// Deep-agents loop toggles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeepAgentConfig {
    pub max_steps: u32,
    pub critic_rounds: u32,
    pub quality_threshold: f64,
}

impl Default for DeepAgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            critic_rounds: 2,
            quality_threshold: 0.7,
        }
    }
}

/// Immutable per-process settings.
///
/// **Interaction**: produced once at startup; every subsystem borrows its
/// slice of this (breaker policies, RAG knobs, model names, loop budget).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Ordered model preferences: first entry is the default slot, second
    /// (when present) the fast slot.
    pub llm_models: Vec<String>,
    pub deep_model: String,
    pub fallback_model: String,
    pub embedding_model: String,
    /// Vector backend name; `pinecone` is the primary.
    pub vector_db: String,
    pub pinecone_api_key: String,
    pub pinecone_index_host: String,
    pub pinecone_namespace: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub retrieval: RetrievalConfig,
    pub web_policy: ToolPolicy,
    pub youtube_policy: ToolPolicy,
    pub supadata_policy: ToolPolicy,
    pub max_loops: u32,
    pub semantic_cache_ttl_secs: u64,
    pub deep_agents: DeepAgentConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_models: vec!["gpt-5.1".to_string(), "gemini-2.0-flash".to_string()],
            deep_model: "gpt-5.1".to_string(),
            fallback_model: "gemini-2.0-flash".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            vector_db: "pinecone".to_string(),
            pinecone_api_key: String::new(),
            pinecone_index_host: String::new(),
            pinecone_namespace: "default".to_string(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            retrieval: RetrievalConfig::default(),
            web_policy: ToolPolicy::default(),
            youtube_policy: ToolPolicy::default(),
            supadata_policy: ToolPolicy::default(),
            max_loops: 2,
            semantic_cache_ttl_secs: 3600,
            deep_agents: DeepAgentConfig::default(),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn tool_policy_from_env(prefix: &str) -> ToolPolicy {
    let d = ToolPolicy::default();
    ToolPolicy {
        fail_max: env_parse(&format!("{prefix}_FAIL_MAX"), d.fail_max),
        reset_timeout_secs: env_parse(&format!("{prefix}_RESET_TIMEOUT_SECS"), d.reset_timeout_secs),
        timeout_secs: env_parse(&format!("{prefix}_TIMEOUT_SECS"), d.timeout_secs),
        max_retries: env_parse(&format!("{prefix}_MAX_RETRIES"), d.max_retries),
        backoff_base_secs: env_parse(&format!("{prefix}_BACKOFF_BASE_SECS"), d.backoff_base_secs),
        backoff_max_secs: env_parse(&format!("{prefix}_BACKOFF_MAX_SECS"), d.backoff_max_secs),
        jitter_secs: env_parse(&format!("{prefix}_JITTER_SECS"), d.jitter_secs),
    }
}

impl Settings {
    /// Loads settings from the environment (after `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        let d = Settings::default();
        let llm_models: Vec<String> = env_str("LLM_MODELS", &d.llm_models.join(","))
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            llm_models: if llm_models.is_empty() {
                d.llm_models.clone()
            } else {
                llm_models
            },
            deep_model: env_str("DEEP_LLM_MODEL", &d.deep_model),
            fallback_model: env_str("FALLBACK_LLM_MODEL", &d.fallback_model),
            embedding_model: env_str("EMBEDDING_MODEL", &d.embedding_model),
            vector_db: env_str("VECTOR_DB", &d.vector_db),
            pinecone_api_key: env_str("PINECONE_API_KEY", ""),
            pinecone_index_host: env_str("PINECONE_INDEX_HOST", ""),
            pinecone_namespace: env_str("PINECONE_NAMESPACE", &d.pinecone_namespace),
            openai_api_key: env_str("OPENAI_API_KEY", ""),
            openai_base_url: env_str("OPENAI_BASE_URL", &d.openai_base_url),
            retrieval: RetrievalConfig {
                vector_weight: env_parse("RAG_VECTOR_WEIGHT", d.retrieval.vector_weight),
                keyword_weight: env_parse("RAG_KEYWORD_WEIGHT", d.retrieval.keyword_weight),
                max_results: env_parse("RAG_MAX_RESULTS", d.retrieval.max_results),
                similarity_threshold: env_parse(
                    "RAG_SIMILARITY_THRESHOLD",
                    d.retrieval.similarity_threshold,
                ),
                rerank_top_k: env_parse("RAG_RERANK_TOP_K", d.retrieval.rerank_top_k),
                max_retrieval_docs: env_parse(
                    "RAG_MAX_RETRIEVAL_DOCS",
                    d.retrieval.max_retrieval_docs,
                ),
                reranker_threshold: env_parse("RERANKER_THRESHOLD", d.retrieval.reranker_threshold),
                query_expansion_enabled: env_parse(
                    "QUERY_EXPANSION_ENABLED",
                    d.retrieval.query_expansion_enabled,
                ),
            },
            web_policy: tool_policy_from_env("MCP_WEB"),
            youtube_policy: tool_policy_from_env("MCP_YOUTUBE"),
            supadata_policy: tool_policy_from_env("MCP_SUPADATA"),
            max_loops: env_parse("MAX_LOOPS", d.max_loops),
            semantic_cache_ttl_secs: env_parse("SEMANTIC_CACHE_TTL_SECS", d.semantic_cache_ttl_secs),
            deep_agents: DeepAgentConfig {
                max_steps: env_parse("DEEP_AGENTS_MAX_STEPS", d.deep_agents.max_steps),
                critic_rounds: env_parse("DEEP_AGENTS_CRITIC_ROUNDS", d.deep_agents.critic_rounds),
                quality_threshold: env_parse(
                    "DEEP_AGENTS_QUALITY_THRESHOLD",
                    d.deep_agents.quality_threshold,
                ),
            },
        }
    }

    /// First configured model: the default slot.
    pub fn default_model(&self) -> &str {
        self.llm_models
            .first()
            .map(String::as_str)
            .unwrap_or("gpt-5.1")
    }

    /// Second configured model when present, else the fallback: the fast slot.
    pub fn fast_model(&self) -> &str {
        self.llm_models
            .get(1)
            .map(String::as_str)
            .unwrap_or(self.fallback_model.as_str())
    }
}

/// Per-agent runtime configuration: model preferences plus backends.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_key: String,
    pub llm_models: Vec<String>,
    pub embedding_model: String,
    pub vector_db: String,
    /// Free-form extras merged from caller overrides.
    pub extra: HashMap<String, serde_json::Value>,
}

/// Resolves the runtime config for one agent, applying caller overrides on
/// top of process settings.
pub fn agent_runtime_config(
    settings: &Settings,
    agent_key: &str,
    overrides: Option<&HashMap<String, serde_json::Value>>,
) -> AgentConfig {
    let mut cfg = AgentConfig {
        agent_key: agent_key.to_string(),
        llm_models: settings.llm_models.clone(),
        embedding_model: settings.embedding_model.clone(),
        vector_db: settings.vector_db.clone(),
        extra: HashMap::new(),
    };
    if let Some(extra) = overrides {
        for (k, v) in extra {
            match k.as_str() {
                "llm_models" => {
                    if let Some(list) = v.as_array() {
                        let models: Vec<String> = list
                            .iter()
                            .filter_map(|m| m.as_str().map(String::from))
                            .collect();
                        if !models.is_empty() {
                            cfg.llm_models = models;
                        }
                    }
                }
                "embedding_model" => {
                    if let Some(s) = v.as_str() {
                        cfg.embedding_model = s.to_string();
                    }
                }
                "vector_db" => {
                    if let Some(s) = v.as_str() {
                        cfg.vector_db = s.to_string();
                    }
                }
                _ => {
                    cfg.extra.insert(k.clone(), v.clone());
                }
            }
        }
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: defaults match the documented policy table.
    #[test]
    fn default_settings_match_spec() {
        let s = Settings::default();
        assert_eq!(s.max_loops, 2);
        assert_eq!(s.semantic_cache_ttl_secs, 3600);
        assert_eq!(s.web_policy.fail_max, 3);
        assert_eq!(s.web_policy.reset_timeout_secs, 30);
        assert_eq!(s.web_policy.timeout_secs, 8);
        assert!((s.retrieval.vector_weight - 0.7).abs() < f64::EPSILON);
        assert!((s.retrieval.keyword_weight - 0.3).abs() < f64::EPSILON);
        assert_eq!(s.vector_db, "pinecone");
    }

    /// **Scenario**: first llm model becomes the default slot, second the
    /// fast slot.
    #[test]
    fn model_slots_follow_list_order() {
        let s = Settings::default();
        assert_eq!(s.default_model(), "gpt-5.1");
        assert_eq!(s.fast_model(), "gemini-2.0-flash");
    }

    /// **Scenario**: agent overrides replace models but unknown keys land in
    /// `extra`.
    #[test]
    fn agent_config_applies_overrides() {
        let s = Settings::default();
        let mut overrides = HashMap::new();
        overrides.insert(
            "llm_models".to_string(),
            serde_json::json!(["claude-sonnet-4-5"]),
        );
        overrides.insert("top_k".to_string(), serde_json::json!(3));
        let cfg = agent_runtime_config(&s, "mission", Some(&overrides));
        assert_eq!(cfg.llm_models, vec!["claude-sonnet-4-5".to_string()]);
        assert_eq!(cfg.extra.get("top_k"), Some(&serde_json::json!(3)));
        assert_eq!(cfg.agent_key, "mission");
    }
}
