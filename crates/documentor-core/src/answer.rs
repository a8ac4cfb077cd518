//! Grounded answer generation.
//!
//! Retrieved parent texts are joined with blank lines and placed into the
//! `{context}` slot of a fixed study-assistant instruction. The instruction
//! carries two worked examples that set the expected depth of an answer.

use std::sync::Arc;

use tracing::debug;

use crate::error::{RagError, Result};
use crate::llm::{build_prompt, ChatModel};
use crate::models::{Segment, Turn};

/// Placeholder replaced by the formatted context.
pub const CONTEXT_SLOT: &str = "{context}";

/// System instruction for answer generation. Contains [`CONTEXT_SLOT`].
pub const QA_SYSTEM_PROMPT: &str = concat!(
    "You are a helpful and knowledgeable study assistant. Use the following context ",
    "from the course material to answer the question. Provide a thorough, detailed, ",
    "and well-explained response that covers all relevant aspects of the topic. ",
    "If you don't know the answer based on the context, just say that you don't know, ",
    "do not make up an answer.\n\n",
    "### Example 1\n",
    "Context:\n",
    "Photosynthesis is the process by which green plants and some other organisms use sunlight to synthesize ",
    "foods with the help of chlorophyll. It typically involves the green pigment chlorophyll and generates oxygen as a by-product.\n",
    "Question:\n",
    "What is photosynthesis?\n",
    "Answer:\n",
    "Photosynthesis is a biological process that enables green plants, algae, and some bacteria to convert light energy, usually from the sun, into chemical energy in the form of glucose. ",
    "This process takes place in the chloroplasts of plant cells, where the green pigment chlorophyll captures light energy. The light energy drives the conversion of carbon dioxide from the air and water from the soil into glucose and oxygen. ",
    "The overall chemical reaction can be summarized as: 6CO₂ + 6H₂O + light → C₆H₁₂O₆ + 6O₂. This process is essential for life on Earth because it forms the base of the food chain and produces the oxygen necessary for most organisms to survive.\n\n",
    "### Example 2\n",
    "Context:\n",
    "In economics, opportunity cost refers to the value of the next best alternative that is forgone when making a decision. It represents the benefits an individual, investor, or business misses out on when choosing one alternative over another.\n",
    "Question:\n",
    "What is opportunity cost?\n",
    "Answer:\n",
    "Opportunity cost is an important economic concept that refers to the value of the next best alternative that must be given up when a choice is made. It reflects the trade-offs inherent in every decision, where selecting one option means forgoing another. ",
    "For example, if a student chooses to spend time studying for an exam instead of working a part-time job, the opportunity cost is the wage they would have earned during that time. ",
    "Understanding opportunity cost helps individuals and businesses make more informed decisions by considering what they are sacrificing in order to pursue a specific option.\n\n",
    "### Now use the following context to answer the next question:\n\n",
    "{context}"
);

/// Join segment texts in rank order, separated by a blank line.
pub fn format_context(context: &[Segment]) -> String {
    context
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render the system instruction for a given context.
pub fn render_system_prompt(context: &[Segment]) -> String {
    QA_SYSTEM_PROMPT.replace(CONTEXT_SLOT, &format_context(context))
}

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Answer `question` from `context`, with `history` as prior turns.
    ///
    /// The model output is returned verbatim.
    pub async fn answer(
        &self,
        context: &[Segment],
        history: &[Turn],
        question: &str,
    ) -> Result<String> {
        let prompt = build_prompt(render_system_prompt(context), history, question);
        debug!(
            segments = context.len(),
            history = history.len(),
            "generating answer"
        );
        self.model.complete(&prompt).await.map_err(|e| match e {
            RagError::Generation(_) => e,
            other => RagError::Generation(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatRole};
    use crate::models::Metadata;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatModel for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            *self.seen.lock().unwrap() = messages.to_vec();
            Ok("  answer with spacing \n".to_string())
        }
    }

    fn seg(text: &str) -> Segment {
        Segment {
            id: text.to_string(),
            parent_id: None,
            text: text.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn context_joined_with_blank_lines() {
        let ctx = vec![seg("first"), seg("second")];
        assert_eq!(format_context(&ctx), "first\n\nsecond");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn system_prompt_has_examples_and_context() {
        let rendered = render_system_prompt(&[seg("Opportunity cost is a trade-off.")]);
        assert!(rendered.contains("### Example 1"));
        assert!(rendered.contains("What is opportunity cost?"));
        assert!(rendered.ends_with("Opportunity cost is a trade-off."));
        assert!(!rendered.contains(CONTEXT_SLOT));
    }

    #[tokio::test]
    async fn answer_is_verbatim_and_prompt_is_ordered() {
        let model = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let generator = AnswerGenerator::new(model.clone());
        let history = vec![Turn::user("earlier"), Turn::assistant("reply")];

        let answer = generator
            .answer(&[seg("ctx")], &history, "the question")
            .await
            .unwrap();
        assert_eq!(answer, "  answer with spacing \n");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].role, ChatRole::System);
        assert!(seen[0].content.ends_with("ctx"));
        assert_eq!(seen[3].content, "the question");
    }
}
