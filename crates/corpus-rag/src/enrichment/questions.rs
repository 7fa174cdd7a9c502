//! Questions-answered extraction

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::generation::PromptBuilder;
use crate::providers::ModelBackend;
use crate::types::Node;

use super::Enricher;

/// Writes `questions_this_excerpt_can_answer`, used only for embedding
pub struct QuestionsAnsweredExtractor {
    backend: Arc<dyn ModelBackend>,
    questions: usize,
}

impl QuestionsAnsweredExtractor {
    pub fn new(backend: Arc<dyn ModelBackend>, questions: usize) -> Self {
        Self {
            backend,
            questions: questions.max(1),
        }
    }
}

#[async_trait]
impl Enricher for QuestionsAnsweredExtractor {
    fn field(&self) -> &'static str {
        "questions_this_excerpt_can_answer"
    }

    fn embedding_only(&self) -> bool {
        true
    }

    async fn enrich(&self, node: &Node, _prepared: Option<&str>) -> Result<String> {
        let prompt = PromptBuilder::build_questions_prompt(&node.text, self.questions);
        let questions = self.backend.complete(&prompt).await?;
        Ok(questions.trim().to_string())
    }
}
