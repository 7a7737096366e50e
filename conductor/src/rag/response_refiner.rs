//! Response post-processing: hallucination check and persona refinement.

use std::sync::Arc;

use crate::llm::{GenerateOptions, GenerationEngine};
use crate::retrieval::RetrievedDocument;

/// Warning paragraph appended when the support check answers NO.
pub const HALLUCINATION_WARNING: &str = "\n\n*(주의: 생성된 답변이 제공된 문서의 내용과 일치하지 않을 수 있습니다. 원본 출처를 확인해주세요.)*";

const PERSONA_INSTRUCTION: &str = "You are a Response Refiner. Polish the following AI response.\n\
Style guidelines:\n\
1. Friendly & helpful: warm, encouraging tone.\n\
2. Professional: accurate without stiff bureaucratic language.\n\
3. Structured: clear Markdown headers, bullet points, bold key insights.\n\
4. Korean native: natural Korean phrasing.\n\
Do NOT change the core facts or numbers.\n\nOriginal Response:";

/// Refines raw model output: optional hallucination check against retrieved
/// documents, then a fast-model persona/formatting pass. Short responses skip
/// the model round; refiner failure returns the raw response.
pub struct ResponseRefiner {
    engine: Arc<GenerationEngine>,
}

impl ResponseRefiner {
    pub fn new(engine: Arc<GenerationEngine>) -> Self {
        Self { engine }
    }

    pub async fn refine(
        &self,
        raw_response: &str,
        documents: &[RetrievedDocument],
        check_hallucination: bool,
    ) -> String {
        if raw_response.is_empty() {
            return String::new();
        }
        let mut response = raw_response.to_string();

        if check_hallucination && !documents.is_empty() {
            let supported = self.is_supported(&response, documents).await;
            if !supported {
                tracing::warn!("potential hallucination detected, appending warning");
                response.push_str(HALLUCINATION_WARNING);
            }
        }

        // Very short responses are not worth a model round.
        if response.chars().count() < 50 {
            return response;
        }
        if !self.engine.has_models() {
            return response;
        }

        let opts = GenerateOptions {
            model_name: Some(self.engine.fast_model().to_string()),
            ..Default::default()
        };
        let refined = self
            .engine
            .generate(&format!("{PERSONA_INSTRUCTION}\n\n{response}"), &opts)
            .await;
        if refined.trim().is_empty() {
            response
        } else {
            refined
        }
    }

    /// Fast-model YES/NO support check against the top-3 document excerpts.
    /// Fails open.
    async fn is_supported(&self, response: &str, documents: &[RetrievedDocument]) -> bool {
        if !self.engine.has_models() {
            return true;
        }
        let docs_text: String = documents
            .iter()
            .take(3)
            .map(|d| d.content.chars().take(300).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n");
        let claim: String = response.chars().take(1000).collect();
        let prompt = format!(
            "Task: Verify if the Claim is supported by the Context.\n\n\
             Context:\n{docs_text}\n\nClaim:\n{claim}\n\n\
             Does the Context support the Claim? Answer only \"YES\" or \"NO\"."
        );
        let opts = GenerateOptions {
            model_name: Some(self.engine.fast_model().to_string()),
            ..Default::default()
        };
        let verdict = self.engine.generate(&prompt, &opts).await;
        verdict.trim().to_uppercase().contains("YES")
    }
}
