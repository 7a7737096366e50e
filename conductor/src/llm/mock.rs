//! Scripted LLM client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::message::Message;

use super::{LlmClient, LlmResponse};

/// Mock client that replays scripted responses in order, then a default.
///
/// `MockLlm::failing` always errors, which exercises retry and fallback
/// cascades without a network.
pub struct MockLlm {
    name: String,
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    fail_always: bool,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    pub fn new(name: impl Into<String>, responses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(responses.into()),
            default_response: "ok".to_string(),
            fail_always: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Mock that answers every call with the same text.
    pub fn fixed(name: impl Into<String>, response: impl Into<String>) -> Self {
        let mut mock = Self::new(name, Vec::new());
        mock.default_response = response.into();
        mock
    }

    /// Mock whose every call fails with an llm error.
    pub fn failing(name: impl Into<String>) -> Self {
        let mut mock = Self::new(name, Vec::new());
        mock.fail_always = true;
        mock
    }

    /// Number of invocations observed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Messages of the n-th invocation, if recorded.
    pub fn call_messages(&self, n: usize) -> Option<Vec<Message>> {
        self.calls.lock().ok().and_then(|c| c.get(n).cloned())
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        if self.fail_always {
            return Err(AgentError::Llm(format!("mock {} failed", self.name)));
        }
        let content = self
            .responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.default_response.clone());
        Ok(LlmResponse {
            content,
            tool_calls: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: scripted responses replay in order, then the default.
    #[tokio::test]
    async fn replays_in_order_then_default() {
        let mock = MockLlm::new("m", vec!["a".into(), "b".into()]);
        assert_eq!(mock.invoke(&[]).await.unwrap().content, "a");
        assert_eq!(mock.invoke(&[]).await.unwrap().content, "b");
        assert_eq!(mock.invoke(&[]).await.unwrap().content, "ok");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn failing_mock_errors() {
        let mock = MockLlm::failing("bad");
        assert!(mock.invoke(&[]).await.is_err());
    }
}
