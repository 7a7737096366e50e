//! OpenAI-compatible chat completion client.
//!
//! Field names match the Chat Completions API; the base URL is configurable
//! so any OpenAI-compatible endpoint (or a test server) can stand in.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentError;
use crate::message::Message;

use super::{FunctionSpec, LlmClient, LlmResponse, ToolCall};

/// Chat client over the `/v1/chat/completions` wire.
pub struct ChatOpenAI {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments object.
    arguments: String,
}

impl ChatOpenAI {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| match m {
                Message::Tool { call_id, text } => json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": text,
                }),
                other => json!({
                    "role": other.role(),
                    "content": other.content(),
                }),
            })
            .collect()
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[FunctionSpec]>,
    ) -> Result<LlmResponse, AgentError> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::wire_messages(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if let (Some(specs), Some(obj)) = (tools, body.as_object_mut()) {
            if !specs.is_empty() {
                let tools_json: Vec<serde_json::Value> = specs
                    .iter()
                    .map(|s| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": s.name,
                                "description": s.description,
                                "parameters": s.parameters,
                            }
                        })
                    })
                    .collect();
                obj.insert("tools".to_string(), json!(tools_json));
            }
        }

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Llm(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let err_body = res.text().await.unwrap_or_default();
            return Err(AgentError::Llm(format!(
                "chat completion error {status}: {err_body}"
            )));
        }
        let parsed: ChatCompletionResponse = res
            .json()
            .await
            .map_err(|e| AgentError::Llm(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Llm("empty choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect();

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, AgentError> {
        self.complete(messages, None).await
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        tools: &[FunctionSpec],
    ) -> Result<LlmResponse, AgentError> {
        self.complete(messages, Some(tools)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: tool messages carry tool_call_id on the wire; others
    /// carry plain role/content.
    #[test]
    fn wire_messages_shape() {
        let msgs = vec![
            Message::System("s".into()),
            Message::User("u".into()),
            Message::Tool {
                call_id: "c9".into(),
                text: "{\"ok\":true}".into(),
            },
        ];
        let wire = ChatOpenAI::wire_messages(&msgs);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["content"], "u");
        assert_eq!(wire[2]["tool_call_id"], "c9");
    }

    #[test]
    fn builder_sets_knobs() {
        let c = ChatOpenAI::new("gpt-5.1", "k")
            .with_temperature(0.0)
            .with_max_tokens(512)
            .with_base_url("http://localhost:9999/");
        assert_eq!(c.name(), "gpt-5.1");
        assert!(c.supports_tools());
        assert_eq!(c.base_url, "http://localhost:9999/");
    }
}
