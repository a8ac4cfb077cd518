//! History-aware query rewriting.
//!
//! A follow-up such as "what gas does it produce?" retrieves poorly on its
//! own. [`QueryRewriter`] asks the chat model to turn the latest question
//! into a standalone one using the conversation so far. With no history
//! there is nothing to resolve, so the question passes through untouched.

use std::sync::Arc;

use tracing::debug;

use crate::error::{RagError, Result};
use crate::llm::{build_prompt, ChatModel};
use crate::models::Turn;

/// System instruction for the rewrite call.
pub const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, \
formulate a standalone question which can be understood \
without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Produce a standalone question for retrieval.
    pub async fn rewrite(&self, history: &[Turn], question: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let prompt = build_prompt(CONTEXTUALIZE_PROMPT.to_string(), history, question);
        let output = self
            .model
            .complete(&prompt)
            .await
            .map_err(|e| match e {
                RagError::Generation(_) => e,
                other => RagError::Generation(other.to_string()),
            })?;

        let standalone = output.trim();
        if standalone.is_empty() {
            return Err(RagError::Generation(
                "query rewrite returned empty output".to_string(),
            ));
        }

        debug!(original = question, standalone, "rewrote follow-up question");
        Ok(standalone.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatRole};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed reply and records every prompt it receives.
    struct Scripted {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("connection refused".to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.reply.clone().map_err(RagError::Generation)
        }
    }

    #[tokio::test]
    async fn empty_history_skips_model() {
        let model = Scripted::replying("should not be used");
        let rewriter = QueryRewriter::new(model.clone());
        let out = rewriter.rewrite(&[], "What is X?").await.unwrap();
        assert_eq!(out, "What is X?");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn follow_up_sends_history_to_model() {
        let model = Scripted::replying("  What gas does photosynthesis produce?\n");
        let rewriter = QueryRewriter::new(model.clone());
        let history = vec![
            Turn::user("What is photosynthesis?"),
            Turn::assistant("Plants converting light into chemical energy."),
        ];

        let out = rewriter
            .rewrite(&history, "What gas does it produce?")
            .await
            .unwrap();
        assert_eq!(out, "What gas does photosynthesis produce?");

        let prompts = model.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, ChatRole::System);
        assert_eq!(prompt[0].content, CONTEXTUALIZE_PROMPT);
        assert_eq!(prompt[1].content, "What is photosynthesis?");
        assert_eq!(prompt[3].content, "What gas does it produce?");
    }

    #[tokio::test]
    async fn blank_output_is_generation_error() {
        let rewriter = QueryRewriter::new(Scripted::replying("   "));
        let err = rewriter
            .rewrite(&[Turn::user("hi")], "and then?")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn model_failure_is_generation_error() {
        let rewriter = QueryRewriter::new(Scripted::failing());
        let err = rewriter
            .rewrite(&[Turn::user("hi")], "and then?")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }
}
