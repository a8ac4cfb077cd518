//! Chat model boundary.
//!
//! The rewriter and the answer generator both talk to the language model
//! through [`ChatModel`]: a structured prompt goes in (system instruction,
//! history turns, user turn) and generated text comes out. Providers map
//! transport failures, timeouts, and malformed payloads to
//! [`RagError::Generation`](crate::error::RagError::Generation).

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Role, Turn};

/// Role of a prompt message as understood by chat APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        };
        Self {
            role,
            content: turn.content.clone(),
        }
    }
}

/// Assemble `system`, then every history turn, then the user question.
pub fn build_prompt(system: String, history: &[Turn], question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(question));
    messages
}

/// A text-generation endpoint treated as an opaque request/response call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for the given prompt messages.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_order_is_system_history_user() {
        let history = vec![Turn::user("What is photosynthesis?"), Turn::assistant("A process.")];
        let prompt = build_prompt("sys".to_string(), &history, "What gas does it produce?");
        let roles: Vec<ChatRole> = prompt.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
        assert_eq!(prompt[3].content, "What gas does it produce?");
    }

    #[test]
    fn chat_message_json_shape() {
        let json = serde_json::to_value(ChatMessage::system("x")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "x"}));
    }
}
