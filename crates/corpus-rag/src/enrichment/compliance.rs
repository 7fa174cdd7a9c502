//! Invoice compliance checking

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::generation::PromptBuilder;
use crate::providers::ModelBackend;
use crate::types::Node;

use super::Enricher;

/// Writes `compliance_issues`, used only for embedding
pub struct ComplianceChecker {
    backend: Arc<dyn ModelBackend>,
    issues: usize,
}

impl ComplianceChecker {
    pub fn new(backend: Arc<dyn ModelBackend>, issues: usize) -> Self {
        Self {
            backend,
            issues: issues.max(1),
        }
    }
}

#[async_trait]
impl Enricher for ComplianceChecker {
    fn field(&self) -> &'static str {
        "compliance_issues"
    }

    fn embedding_only(&self) -> bool {
        true
    }

    async fn enrich(&self, node: &Node, _prepared: Option<&str>) -> Result<String> {
        let prompt = PromptBuilder::build_compliance_prompt(&node.text, self.issues);
        let issues = self.backend.complete(&prompt).await?;
        Ok(issues.trim().to_string())
    }
}
