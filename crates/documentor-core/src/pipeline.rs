//! Conversational RAG pipeline.
//!
//! Wires the three stages of one question:
//!
//! 1. [`QueryRewriter`] turns the question into a standalone one.
//! 2. [`HierarchicalRetriever`] fetches parents for the standalone question.
//! 3. [`AnswerGenerator`] answers the **original** question from those parents.
//!
//! The pipeline keeps no conversation state; callers pass history in.

use std::sync::Arc;

use tracing::info;

use crate::answer::AnswerGenerator;
use crate::error::Result;
use crate::llm::ChatModel;
use crate::models::{RagResponse, Turn};
use crate::retriever::HierarchicalRetriever;
use crate::rewrite::QueryRewriter;

pub struct ConversationalPipeline {
    rewriter: QueryRewriter,
    retriever: Arc<HierarchicalRetriever>,
    generator: AnswerGenerator,
}

impl ConversationalPipeline {
    pub fn new(
        rewriter: QueryRewriter,
        retriever: Arc<HierarchicalRetriever>,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            rewriter,
            retriever,
            generator,
        }
    }

    /// Build a pipeline whose rewriter and generator share one chat model.
    pub fn with_model(retriever: Arc<HierarchicalRetriever>, model: Arc<dyn ChatModel>) -> Self {
        Self::new(
            QueryRewriter::new(model.clone()),
            retriever,
            AnswerGenerator::new(model),
        )
    }

    pub fn retriever(&self) -> &Arc<HierarchicalRetriever> {
        &self.retriever
    }

    /// Answer `question` given the prior `history`.
    pub async fn ask(&self, history: &[Turn], question: &str) -> Result<RagResponse> {
        let standalone = self.rewriter.rewrite(history, question).await?;
        let context = self.retriever.retrieve(&standalone).await?;
        info!(
            history = history.len(),
            segments = context.len(),
            "retrieved context"
        );
        let answer = self.generator.answer(&context, history, question).await?;
        Ok(RagResponse {
            answer,
            retrieved_context: context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::RecursiveSplitter;
    use crate::embedding::Embedder;
    use crate::error::RagError;
    use crate::llm::{ChatMessage, ChatRole};
    use crate::models::Document;
    use crate::rewrite::CONTEXTUALIZE_PROMPT;
    use crate::store::memory::{InMemoryParentStore, InMemoryVectorIndex};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Embeds by keyword presence so retrieval is predictable.
    struct KeywordEmbedder;

    const KEYWORDS: [&str; 4] = ["photosynthesis", "oxygen", "opportunity", "market"];

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keywords"
        }
        fn dims(&self) -> usize {
            KEYWORDS.len() + 1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    let mut v: Vec<f32> = KEYWORDS
                        .iter()
                        .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                        .collect();
                    v.push(0.1);
                    v
                })
                .collect())
        }
    }

    /// Rewrites follow-ups about "it" into a photosynthesis question and
    /// answers by quoting the first context line.
    struct StudyModel {
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatModel for StudyModel {
        fn model_name(&self) -> &str {
            "study"
        }
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            let system = &messages[0].content;
            if system == CONTEXTUALIZE_PROMPT {
                return Ok("What gas does photosynthesis produce?".to_string());
            }
            let context = system
                .rsplit("### Now use the following context to answer the next question:\n\n")
                .next()
                .unwrap_or("");
            Ok(format!("Based on the material: {}", context))
        }
    }

    async fn pipeline() -> (ConversationalPipeline, Arc<StudyModel>) {
        let retriever = HierarchicalRetriever::new(
            RecursiveSplitter::new(200, 0).unwrap(),
            RecursiveSplitter::new(60, 0).unwrap(),
            Arc::new(KeywordEmbedder),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryParentStore::new()),
        )
        .with_k(1);
        retriever
            .ingest(&[
                Document::new("Photosynthesis in plants releases oxygen as a by-product."),
                Document::new(
                    "Opportunity cost is the value of the next best alternative given up.",
                ),
            ])
            .await
            .unwrap();

        let model = Arc::new(StudyModel {
            prompts: Mutex::new(Vec::new()),
        });
        (
            ConversationalPipeline::with_model(Arc::new(retriever), model.clone()),
            model,
        )
    }

    #[tokio::test]
    async fn first_question_is_grounded() {
        let (pipeline, model) = pipeline().await;
        let response = pipeline.ask(&[], "What is opportunity cost?").await.unwrap();

        assert!(response.answer.contains("next best alternative"));
        assert!(!response.answer.contains("I don't know"));
        assert_eq!(response.retrieved_context.len(), 1);
        // No history: only the answer call reaches the model.
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn follow_up_retrieves_with_rewrite_but_answers_original() {
        let (pipeline, model) = pipeline().await;
        let history = vec![
            Turn::user("What is photosynthesis?"),
            Turn::assistant("Plants turning light into energy."),
        ];

        let response = pipeline
            .ask(&history, "What gas does it produce?")
            .await
            .unwrap();
        assert!(response.retrieved_context[0].text.contains("oxygen"));

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        let answer_prompt = &prompts[1];
        let last = answer_prompt.last().unwrap();
        assert_eq!(last.role, ChatRole::User);
        assert_eq!(last.content, "What gas does it produce?");
        assert_eq!(answer_prompt.len(), history.len() + 2);
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        struct Down;
        #[async_trait]
        impl ChatModel for Down {
            fn model_name(&self) -> &str {
                "down"
            }
            async fn complete(&self, _: &[ChatMessage]) -> Result<String> {
                Err(RagError::Generation("timed out".into()))
            }
        }

        let (pipeline, _) = pipeline().await;
        let broken = ConversationalPipeline::with_model(pipeline.retriever().clone(), Arc::new(Down));
        let err = broken.ask(&[], "What is opportunity cost?").await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }
}
