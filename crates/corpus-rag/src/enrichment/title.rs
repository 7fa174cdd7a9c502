//! Document title extraction

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::ModelBackend;
use crate::types::Node;

use super::Enricher;

/// Writes `document_title`: a title drawn from the leading nodes of the
/// document, shared by every node of that document.
pub struct TitleExtractor {
    backend: Arc<dyn ModelBackend>,
    /// Leading nodes that contribute candidate titles
    nodes: usize,
}

impl TitleExtractor {
    pub fn new(backend: Arc<dyn ModelBackend>, nodes: usize) -> Self {
        Self {
            backend,
            nodes: nodes.max(1),
        }
    }
}

#[async_trait]
impl Enricher for TitleExtractor {
    fn field(&self) -> &'static str {
        "document_title"
    }

    async fn prepare(&self, document_nodes: &[Node]) -> Result<Option<String>> {
        let mut candidates = Vec::new();
        for node in document_nodes.iter().take(self.nodes) {
            let prompt = PromptBuilder::build_title_node_prompt(&node.text);
            candidates.push(self.backend.complete(&prompt).await?.trim().to_string());
        }

        if candidates.len() <= 1 {
            return Ok(candidates.pop());
        }

        let prompt = PromptBuilder::build_title_combine_prompt(&candidates);
        let title = self.backend.complete(&prompt).await?;
        Ok(Some(title.trim().to_string()))
    }

    async fn enrich(&self, node: &Node, prepared: Option<&str>) -> Result<String> {
        prepared
            .map(str::to_string)
            .ok_or_else(|| Error::llm(format!("No title for document {}", node.source_id)))
    }
}
