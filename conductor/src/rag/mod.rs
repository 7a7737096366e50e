//! RAG pipeline: cache → expansion → hybrid retrieval → rerank → context →
//! optimization → generation → hallucination check → refinement → cache.
//!
//! Every stage degrades instead of failing; the pipeline always returns a
//! `RagOutcome` and never panics or raises past its boundary.

pub mod context_builder;
pub mod prompt_optimizer;
pub mod query_expander;
pub mod response_refiner;
pub mod semantic_cache;

pub use context_builder::{ContextPromptBuilder, HistoryTurn};
pub use prompt_optimizer::PromptOptimizer;
pub use query_expander::QueryExpander;
pub use response_refiner::{ResponseRefiner, HALLUCINATION_WARNING};
pub use semantic_cache::SemanticCache;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Settings;
use crate::llm::router::route_request;
use crate::llm::{GenerateOptions, GenerationEngine};
use crate::retrieval::{RetrievalEngine, RetrievedDocument};

/// Query category driving system-prompt selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Competency,
    Recommendation,
    Search,
    Analytics,
    DataCollection,
    General,
}

impl QueryType {
    /// Keyword classification of the user message.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let contains = |keys: &[&str]| keys.iter().any(|k| lowered.contains(k));
        if contains(&["역량", "진단", "평가", "수준", "능력"]) {
            QueryType::Competency
        } else if contains(&["추천", "학습자료", "과정", "프로그램"]) {
            QueryType::Recommendation
        } else if contains(&["검색", "찾기", "정보", "자료"]) {
            QueryType::Search
        } else if contains(&["분석", "리포트", "통계", "성과"]) {
            QueryType::Analytics
        } else if contains(&["수집", "데이터", "api", "외부"]) {
            QueryType::DataCollection
        } else {
            QueryType::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Competency => "competency",
            QueryType::Recommendation => "recommendation",
            QueryType::Search => "search",
            QueryType::Analytics => "analytics",
            QueryType::DataCollection => "data_collection",
            QueryType::General => "general",
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            QueryType::Competency => {
                "당신은 크리에이터 역량 진단 전문가입니다. 제공된 자료에 근거하여 \
                 역량 수준과 개선 방향을 한국어로 설명하세요. 근거 없는 주장은 하지 마세요."
            }
            QueryType::Recommendation => {
                "당신은 크리에이터 성장 추천 전문가입니다. 제공된 자료에 근거하여 \
                 맞춤형 추천과 이유를 한국어로 제시하세요."
            }
            _ => {
                "당신은 크리에이터 온보딩 플랫폼의 AI 어시스턴트입니다. 제공된 자료에 \
                 근거하여 한국어로 정확하고 구조적으로 답변하세요. 자료에 없는 내용은 \
                 모른다고 말하세요."
            }
        }
    }
}

/// Caller-supplied user context for one RAG run.
#[derive(Clone, Debug, Default)]
pub struct RagUserContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// "free" | "pro"; drives model routing.
    pub user_tier: String,
    pub interests: Vec<String>,
    pub learning_style: String,
    /// Metadata filter forwarded to vector search.
    pub filters: Option<Value>,
    pub cost_preference: Option<String>,
    /// Analytics payloads and other pass-through keys.
    pub extra: HashMap<String, Value>,
}

/// Result of one pipeline run. Serialized into the orchestrator state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RagOutcome {
    pub success: bool,
    pub response: String,
    pub cached: bool,
    pub retrieved_documents: Vec<RetrievedDocument>,
    pub context: HashMap<String, Value>,
    pub processing_time_ms: u64,
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Analytics payload keys surfaced into the task context for prompt building.
const ANALYTICS_CONTEXT_KEYS: &[&str] = &[
    "report_type",
    "date_range",
    "creator_stats",
    "mission_stats",
    "reward_stats",
    "creator_data",
    "mission_data",
    "reward_data",
    "analytics_data",
];

/// The RAG pipeline.
///
/// **Interaction**: owned by the orchestrator's RAG node; the creator agent
/// reuses the shared `RetrievalEngine` for its enhancement lookups.
pub struct RagPipeline {
    retrieval: Arc<RetrievalEngine>,
    generation: Arc<GenerationEngine>,
    cache: Arc<SemanticCache>,
    expander: QueryExpander,
    context_builder: ContextPromptBuilder,
    optimizer: PromptOptimizer,
    refiner: ResponseRefiner,
    max_retrieval_docs: usize,
    rerank_top_k: usize,
    n_query_variations: usize,
    check_hallucination: bool,
}

impl RagPipeline {
    pub fn new(
        settings: &Settings,
        retrieval: Arc<RetrievalEngine>,
        generation: Arc<GenerationEngine>,
    ) -> Self {
        let cache = Arc::new(SemanticCache::new(Duration::from_secs(
            settings.semantic_cache_ttl_secs,
        )));
        Self {
            expander: QueryExpander::new(generation.clone()),
            context_builder: ContextPromptBuilder::default(),
            optimizer: PromptOptimizer::default(),
            refiner: ResponseRefiner::new(generation.clone()),
            max_retrieval_docs: settings.retrieval.max_retrieval_docs,
            rerank_top_k: settings.retrieval.rerank_top_k,
            n_query_variations: 3,
            check_hallucination: true,
            retrieval,
            generation,
            cache,
        }
    }

    pub fn with_hallucination_check(mut self, enabled: bool) -> Self {
        self.check_hallucination = enabled;
        self
    }

    pub fn semantic_cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub fn retrieval_engine(&self) -> &Arc<RetrievalEngine> {
        &self.retrieval
    }

    pub fn generation_engine(&self) -> &Arc<GenerationEngine> {
        &self.generation
    }

    /// Runs the full pipeline for one query.
    pub async fn process_query(
        &self,
        query: &str,
        query_type: QueryType,
        user_context: &RagUserContext,
        history: &[HistoryTurn],
    ) -> RagOutcome {
        let started = Instant::now();
        if query.trim().is_empty() {
            return RagOutcome {
                success: false,
                error: Some("empty query".to_string()),
                ..Default::default()
            };
        }

        if let Some(cached) = self.cache.get(query) {
            let mut metadata = HashMap::new();
            metadata.insert(
                "query_type".to_string(),
                Value::String(query_type.as_str().to_string()),
            );
            return RagOutcome {
                success: true,
                response: cached,
                cached: true,
                metadata,
                processing_time_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            };
        }

        // Multi-query expansion, then hybrid retrieval for every variation in
        // parallel. Union keeps the first occurrence per doc id.
        let queries = self.expander.expand(query, self.n_query_variations).await;
        let filters = user_context.filters.as_ref();
        let searches = queries
            .iter()
            .map(|q| self.retrieval.hybrid_search(q, self.max_retrieval_docs, filters));
        let results = join_all(searches).await;

        let mut all_docs: Vec<RetrievedDocument> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        for docs in results {
            for doc in docs {
                if seen.insert(doc.id.clone()) {
                    all_docs.push(doc);
                }
            }
        }

        let retrieved = self
            .retrieval
            .rerank_documents(query, all_docs, self.rerank_top_k)
            .await;

        let (context_map, task_context) = self.build_context_maps(&retrieved, user_context, query_type);
        let user_map = self.user_context_map(user_context);
        let prompt = self.context_builder.build(
            query,
            &user_map,
            "linux",
            &retrieved,
            history,
            &task_context,
        );
        let optimized = self.optimizer.optimize(&prompt);

        // Model routing: complexity from retrieval breadth and query length.
        let complexity = if retrieved.len() > 3 || query.chars().count() > 50 {
            "high"
        } else {
            "low"
        };
        let tier = if user_context.user_tier.is_empty() {
            "free"
        } else {
            user_context.user_tier.as_str()
        };
        let cost_pref = user_context.cost_preference.as_deref().unwrap_or("balanced");
        let routing = route_request(&self.generation, tier, complexity, "rag", cost_pref);

        let opts = GenerateOptions {
            system_prompt: Some(query_type.system_prompt().to_string()),
            model_name: Some(routing.model_name.clone()),
            ..Default::default()
        };
        let raw = self.generation.generate(&optimized, &opts).await;
        let validated = self.validate_and_cite(raw, &retrieved);
        let final_response = self
            .refiner
            .refine(&validated, &retrieved, self.check_hallucination)
            .await;

        self.cache.insert(query, &final_response);

        let mut metadata = HashMap::new();
        metadata.insert(
            "query_type".to_string(),
            Value::String(query_type.as_str().to_string()),
        );
        metadata.insert("num_retrieved".to_string(), Value::from(retrieved.len()));
        metadata.insert(
            "model_name".to_string(),
            Value::String(routing.model_name),
        );

        RagOutcome {
            success: true,
            response: final_response,
            cached: false,
            retrieved_documents: retrieved,
            context: context_map,
            processing_time_ms: started.elapsed().as_millis() as u64,
            metadata,
            error: None,
        }
    }

    fn user_context_map(&self, user_context: &RagUserContext) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        if let Some(id) = &user_context.user_id {
            map.insert("user_id".to_string(), Value::String(id.clone()));
        }
        if !user_context.interests.is_empty() {
            map.insert(
                "interests".to_string(),
                Value::Array(
                    user_context
                        .interests
                        .iter()
                        .map(|i| Value::String(i.clone()))
                        .collect(),
                ),
            );
        }
        if !user_context.learning_style.is_empty() {
            map.insert(
                "learning_style".to_string(),
                Value::String(user_context.learning_style.clone()),
            );
        }
        map
    }

    fn build_context_maps(
        &self,
        retrieved: &[RetrievedDocument],
        user_context: &RagUserContext,
        query_type: QueryType,
    ) -> (HashMap<String, Value>, HashMap<String, Value>) {
        let mut context_map = HashMap::new();
        context_map.insert("num_documents".to_string(), Value::from(retrieved.len()));
        if !retrieved.is_empty() {
            let summary: Vec<String> = retrieved
                .iter()
                .take(3)
                .enumerate()
                .map(|(i, d)| {
                    let head: String = d.content.chars().take(200).collect();
                    format!("{}. {head}...", i + 1)
                })
                .collect();
            context_map.insert(
                "document_summary".to_string(),
                Value::String(summary.join("\n")),
            );
        }

        let mut task_context = HashMap::new();
        if query_type == QueryType::Analytics {
            for key in ANALYTICS_CONTEXT_KEYS {
                if let Some(v) = user_context.extra.get(*key) {
                    task_context.insert((*key).to_string(), v.clone());
                    context_map.insert((*key).to_string(), v.clone());
                }
            }
        }
        (context_map, task_context)
    }

    fn validate_and_cite(&self, response: String, retrieved: &[RetrievedDocument]) -> String {
        let mut out = if response.trim().chars().count() < 10 {
            "응답이 너무 짧습니다. 더 자세한 정보를 제공해주세요.".to_string()
        } else {
            response
        };
        if !retrieved.is_empty() {
            let sources: Vec<String> = retrieved
                .iter()
                .take(3)
                .map(|d| {
                    let source = d
                        .metadata
                        .get("source")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown");
                    let date = d
                        .metadata
                        .get("date")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown");
                    format!("- {source} ({date})")
                })
                .collect();
            out.push_str(&format!("\n\n**참고 자료**:\n{}", sources.join("\n")));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::retrieval::{DocumentInput, HashEmbedder, InMemoryVectorStore, LexicalCrossEncoder};

    fn pipeline_with(responses: Vec<String>) -> RagPipeline {
        let settings = Settings::default();
        let retrieval = Arc::new(
            RetrievalEngine::new(settings.retrieval.clone(), Arc::new(HashEmbedder))
                .with_vector_store(Arc::new(InMemoryVectorStore::new()), "memory")
                .with_reranker(Arc::new(LexicalCrossEncoder)),
        );
        let mut engine = GenerationEngine::from_settings(&settings);
        engine.register_model(Arc::new(MockLlm::new("gemini-2.0-flash", responses)));
        let generation = Arc::new(engine);
        RagPipeline::new(&settings, retrieval, generation).with_hallucination_check(false)
    }

    async fn seed(pipeline: &RagPipeline) {
        pipeline
            .retrieval
            .add_documents(vec![DocumentInput {
                id: "policy-1".to_string(),
                content: "크리에이터 온보딩 정책: 등급은 S, A, B, C로 구분됩니다.".to_string(),
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();
    }

    /// **Scenario**: classification keywords map to their query types.
    #[test]
    fn query_type_classification() {
        assert_eq!(QueryType::classify("내 역량 진단해줘"), QueryType::Competency);
        assert_eq!(QueryType::classify("학습자료 추천해줘"), QueryType::Recommendation);
        assert_eq!(QueryType::classify("관련 자료 검색"), QueryType::Search);
        assert_eq!(QueryType::classify("성과 리포트 보여줘"), QueryType::Analytics);
        assert_eq!(QueryType::classify("안녕하세요"), QueryType::General);
    }

    /// **Scenario**: two identical queries (case/whitespace differ) inside
    /// the TTL window return the same response with cached=true.
    #[tokio::test]
    async fn second_identical_query_is_cached() {
        // expansion, generation, refinement for the first run only.
        let pipeline = pipeline_with(vec![
            "변형 쿼리".into(),
            "등급은 S부터 C까지 네 단계입니다. 자세한 내용은 정책 문서를 참고하세요.".into(),
            "등급은 S부터 C까지 네 단계입니다. 자세한 내용은 정책 문서를 참고하세요. (정리됨)".into(),
        ]);
        seed(&pipeline).await;
        let ctx = RagUserContext::default();
        let first = pipeline
            .process_query("등급 정책 자료 알려줘", QueryType::Search, &ctx, &[])
            .await;
        assert!(first.success);
        assert!(!first.cached);

        let second = pipeline
            .process_query("  등급 정책 자료 알려줘 ", QueryType::Search, &ctx, &[])
            .await;
        assert!(second.cached);
        assert_eq!(second.response, first.response);
    }

    /// **Scenario**: retrieval results are bounded by top_k with scores in
    /// [0,1], and the answer carries the source footer.
    #[tokio::test]
    async fn retrieval_bounded_and_cited() {
        let pipeline = pipeline_with(vec![
            "정책 등급".into(),
            "등급 체계는 문서에 따라 S, A, B, C 네 단계로 운영됩니다.".into(),
            "등급 체계는 문서에 따라 S, A, B, C 네 단계로 운영됩니다.\n\n**참고 자료**:\n- 정책 문서".into(),
        ]);
        seed(&pipeline).await;
        let out = pipeline
            .process_query(
                "온보딩 등급 정책 자료",
                QueryType::Search,
                &RagUserContext::default(),
                &[],
            )
            .await;
        assert!(out.success);
        assert!(out.retrieved_documents.len() <= 3);
        for d in &out.retrieved_documents {
            assert!(d.ranking_score() >= 0.0 && d.ranking_score() <= 1.0);
        }
        assert!(out.response.contains("참고 자료") || out.retrieved_documents.is_empty());
    }

    /// **Scenario**: empty query fails fast without touching retrieval.
    #[tokio::test]
    async fn empty_query_fails_fast() {
        let pipeline = pipeline_with(vec![]);
        let out = pipeline
            .process_query("   ", QueryType::General, &RagUserContext::default(), &[])
            .await;
        assert!(!out.success);
        assert!(out.error.is_some());
    }
}
