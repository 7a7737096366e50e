//! Structured context prompt assembly.
//!
//! Sections in order: system/meta, user profile, task context, retrieved
//! knowledge, conversation history, current query. Retrieved documents are
//! clipped head+tail under a per-doc cap; the whole section stops at the
//! character budget with an omission marker.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retrieval::RetrievedDocument;

/// One prior conversation turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Builds the rich context prompt handed to generation.
pub struct ContextPromptBuilder {
    max_context_tokens: usize,
}

impl Default for ContextPromptBuilder {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
        }
    }
}

/// Head+tail clip that keeps both ends of an over-long document.
fn clip(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let head = (max_len * 7) / 10;
    let tail = max_len.saturating_sub(head + 40);
    if tail > 0 {
        let head_part: String = chars[..head].iter().collect();
        let tail_part: String = chars[chars.len() - tail..].iter().collect();
        format!("{head_part}\n...\n[TRUNCATED]\n...\n{tail_part}")
    } else {
        let head_part: String = chars[..max_len.min(chars.len())].iter().collect();
        format!("{head_part}\n...\n[TRUNCATED]")
    }
}

fn render_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let strings: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if strings.is_empty() {
                None
            } else {
                Some(strings.join(", "))
            }
        }
        _ => None,
    }
}

impl ContextPromptBuilder {
    pub fn new(max_context_tokens: usize) -> Self {
        Self { max_context_tokens }
    }

    pub fn build(
        &self,
        query: &str,
        user_context: &HashMap<String, Value>,
        environment: &str,
        retrieved_docs: &[RetrievedDocument],
        history: &[HistoryTurn],
        task_context: &HashMap<String, Value>,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(format!(
            "### System Context\n- Current Time: {}\n- OS/Environment: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            if environment.is_empty() {
                "Unknown"
            } else {
                environment
            }
        ));

        if !user_context.is_empty() {
            let mut lines = vec!["### User Profile".to_string()];
            let mut keys: Vec<&String> = user_context.keys().collect();
            keys.sort();
            for k in keys {
                if let Some(rendered) = user_context.get(k).and_then(render_value) {
                    lines.push(format!("- {k}: {rendered}"));
                }
            }
            if lines.len() > 1 {
                parts.push(lines.join("\n"));
            }
        }

        if !task_context.is_empty() {
            let mut lines = vec!["### Task Context".to_string()];
            let mut keys: Vec<&String> = task_context.keys().collect();
            keys.sort();
            for k in keys {
                if let Some(rendered) = task_context.get(k).and_then(render_value) {
                    lines.push(format!("- {k}: {rendered}"));
                }
            }
            if lines.len() > 1 {
                parts.push(lines.join("\n"));
            }
        }

        if !retrieved_docs.is_empty() {
            parts.push(self.retrieval_section(retrieved_docs));
        }

        if !history.is_empty() {
            let mut lines = vec!["### Conversation History".to_string()];
            let start = history.len().saturating_sub(20);
            for turn in &history[start..] {
                lines.push(format!("{}: {}", turn.role.to_uppercase(), turn.content));
            }
            parts.push(lines.join("\n"));
        }

        parts.push(format!("### Current User Query\n{query}"));
        parts.join("\n\n")
    }

    fn retrieval_section(&self, docs: &[RetrievedDocument]) -> String {
        let mut lines = vec!["### Retrieved Information (Reference Material)".to_string()];
        let limit_chars = self.max_context_tokens * 4;
        let per_doc_cap = ((limit_chars * 65 / 100) / docs.len().min(6).max(1)).clamp(800, 8000);

        let mut total_chars = 0usize;
        for (i, doc) in docs.iter().enumerate() {
            let source = doc
                .metadata
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            let safe_content = clip(&doc.content, per_doc_cap);
            let doc_str = format!("[{}] Source: {}\nContent: {}\n", i + 1, source, safe_content);
            if total_chars + doc_str.len() > limit_chars {
                lines.push(format!(
                    "\n... (Context budget reached. Remaining {} documents omitted.) ...",
                    docs.len() - i
                ));
                break;
            }
            total_chars += doc_str.len();
            lines.push(doc_str);
        }
        lines.push(
            "\n*Note: Use the above information to answer. If the answer is not found, \
             state that you don't know based on the provided context.*"
                .to_string(),
        );
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SearchType;

    fn doc(id: &str, content: &str) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            content: content.to_string(),
            score: 0.9,
            metadata: HashMap::new(),
            search_type: SearchType::Hybrid,
            vector_score: 0.9,
            keyword_score: 0.0,
            rerank_score: None,
            final_score: None,
        }
    }

    /// **Scenario**: sections appear in the fixed order and the query closes
    /// the prompt.
    #[test]
    fn section_order_is_fixed() {
        let builder = ContextPromptBuilder::default();
        let mut user = HashMap::new();
        user.insert("user_id".to_string(), Value::String("u1".into()));
        let prompt = builder.build(
            "최신 정책 알려주세요",
            &user,
            "linux",
            &[doc("d1", "정책 문서 내용")],
            &[HistoryTurn {
                role: "user".into(),
                content: "이전 질문".into(),
            }],
            &HashMap::new(),
        );
        let system_pos = prompt.find("### System Context").unwrap();
        let user_pos = prompt.find("### User Profile").unwrap();
        let docs_pos = prompt.find("### Retrieved Information").unwrap();
        let history_pos = prompt.find("### Conversation History").unwrap();
        let query_pos = prompt.find("### Current User Query").unwrap();
        assert!(system_pos < user_pos && user_pos < docs_pos);
        assert!(docs_pos < history_pos && history_pos < query_pos);
        assert!(prompt.ends_with("최신 정책 알려주세요"));
    }

    /// **Scenario**: an over-long document is clipped with head and tail
    /// preserved around the truncation marker.
    #[test]
    fn long_documents_are_clipped_head_and_tail() {
        let builder = ContextPromptBuilder::new(300);
        let long = "시작".to_string() + &"가".repeat(9000) + "끝";
        let prompt = builder.build(
            "q",
            &HashMap::new(),
            "linux",
            &[doc("d1", &long)],
            &[],
            &HashMap::new(),
        );
        assert!(prompt.contains("[TRUNCATED]"));
        assert!(prompt.contains("시작"));
        assert!(prompt.contains("끝"));
    }

    /// **Scenario**: history renders only the last 20 turns.
    #[test]
    fn history_keeps_last_twenty() {
        let builder = ContextPromptBuilder::default();
        let history: Vec<HistoryTurn> = (0..25)
            .map(|i| HistoryTurn {
                role: "user".into(),
                content: format!("turn-{i}"),
            })
            .collect();
        let prompt = builder.build("q", &HashMap::new(), "", &[], &history, &HashMap::new());
        assert!(!prompt.contains("turn-4"));
        assert!(prompt.contains("turn-5"));
        assert!(prompt.contains("turn-24"));
    }
}
