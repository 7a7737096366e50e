//! Prompt optimization: whitespace collapse and rough context pruning.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::retrieval::RetrievedDocument;

static MULTI_NEWLINE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\n{3,}").ok());
static MULTI_SPACE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[ \t]+").ok());

/// Shrinks prompts before dispatch. Estimation is rough on purpose:
/// ~1.5 chars per token for mixed Korean/English text.
pub struct PromptOptimizer {
    max_context_tokens: usize,
}

impl Default for PromptOptimizer {
    fn default() -> Self {
        Self {
            max_context_tokens: 4000,
        }
    }
}

impl PromptOptimizer {
    pub fn new(max_context_tokens: usize) -> Self {
        Self { max_context_tokens }
    }

    /// Collapses repeated whitespace and trims the prompt.
    pub fn optimize(&self, prompt: &str) -> String {
        let mut out = prompt.to_string();
        if let Some(re) = MULTI_NEWLINE.as_ref() {
            out = re.replace_all(&out, "\n\n").into_owned();
        }
        if let Some(re) = MULTI_SPACE.as_ref() {
            out = re.replace_all(&out, " ").into_owned();
        }
        out.trim().to_string()
    }

    /// Keeps leading context documents until the token estimate is spent.
    pub fn prune_context(&self, docs: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        let mut used = 0f64;
        let budget = self.max_context_tokens as f64;
        let mut kept = Vec::new();
        for doc in docs {
            let estimated_tokens = doc.content.chars().count() as f64 / 1.5;
            if used + estimated_tokens > budget {
                break;
            }
            used += estimated_tokens;
            kept.push(doc);
        }
        kept
    }
}
