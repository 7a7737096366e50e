//! Chat message type shared by the orchestrator state and LLM clients.
//!
//! One enum, one variant per role. `Tool` carries the serialized result of a
//! one-shot function-call round back into the follow-up completion.

use serde::{Deserialize, Serialize};

/// A chat message: system, user, assistant, or tool result.
///
/// **Interaction**: `OrchestratorState::messages` is append-only for the
/// lifetime of a session; `LlmClient::invoke` consumes a slice of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
    Tool { call_id: String, text: String },
}

impl Message {
    /// Role string as it appears on the wire ("system" | "user" | "assistant" | "tool").
    pub fn role(&self) -> &'static str {
        match self {
            Message::System(_) => "system",
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    /// Text content of the message.
    pub fn content(&self) -> &str {
        match self {
            Message::System(s) | Message::User(s) | Message::Assistant(s) => s,
            Message::Tool { text, .. } => text,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Message::User(_))
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant(_))
    }
}

/// Latest user-authored text in a message sequence, if any.
pub fn latest_user_text(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.is_user())
        .map(|m| m.content())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_and_content() {
        assert_eq!(Message::User("hi".into()).role(), "user");
        assert_eq!(Message::Assistant("yo".into()).content(), "yo");
        let t = Message::Tool {
            call_id: "c1".into(),
            text: "{}".into(),
        };
        assert_eq!(t.role(), "tool");
    }

    /// **Scenario**: latest_user_text skips trailing assistant messages.
    #[test]
    fn latest_user_text_skips_assistant_tail() {
        let msgs = vec![
            Message::User("first".into()),
            Message::Assistant("answer".into()),
        ];
        assert_eq!(latest_user_text(&msgs), Some("first"));
        assert_eq!(latest_user_text(&[]), None);
    }

    /// **Scenario**: serde round-trip keeps role tagging stable for
    /// checkpoint payloads.
    #[test]
    fn serde_round_trip() {
        let m = Message::System("sys".into());
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"system\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
