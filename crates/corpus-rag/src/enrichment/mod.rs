//! Per-node metadata enrichment
//!
//! Each enricher writes one named metadata field by asking the model backend.
//! Enrichers are built once at start-up and run concurrently across nodes; a
//! failure omits that node's field and is reported, never raised.

mod compliance;
mod questions;
mod title;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::config::EnrichmentConfig;
use crate::error::{Error, Result};
use crate::providers::ModelBackend;
use crate::types::Node;

pub use compliance::ComplianceChecker;
pub use questions::QuestionsAnsweredExtractor;
pub use title::TitleExtractor;

/// A pluggable per-node annotator
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Metadata field this enricher writes
    fn field(&self) -> &'static str;

    /// Whether the field is only used for embedding, not as generation context
    fn embedding_only(&self) -> bool {
        false
    }

    /// Document-level work shared by all nodes of one document.
    ///
    /// Runs once per document before any `enrich` call for its nodes.
    async fn prepare(&self, _document_nodes: &[Node]) -> Result<Option<String>> {
        Ok(None)
    }

    /// Produce the field value for one node
    async fn enrich(&self, node: &Node, prepared: Option<&str>) -> Result<String>;
}

/// Build the configured enrichers in their fixed order
pub fn build_enrichers(
    config: &EnrichmentConfig,
    backend: Arc<dyn ModelBackend>,
) -> Vec<Arc<dyn Enricher>> {
    let mut enrichers: Vec<Arc<dyn Enricher>> = Vec::new();
    if config.titles {
        enrichers.push(Arc::new(TitleExtractor::new(backend.clone(), config.title_nodes)));
    }
    if config.questions {
        enrichers.push(Arc::new(QuestionsAnsweredExtractor::new(
            backend.clone(),
            config.num_questions,
        )));
    }
    if config.compliance {
        enrichers.push(Arc::new(ComplianceChecker::new(backend, config.num_issues)));
    }
    enrichers
}

/// Runs a fixed list of enrichers over batches of nodes
#[derive(Clone)]
pub struct EnrichmentPipeline {
    enrichers: Vec<Arc<dyn Enricher>>,
    concurrency: usize,
}

impl EnrichmentPipeline {
    pub fn new(enrichers: Vec<Arc<dyn Enricher>>, concurrency: usize) -> Self {
        Self {
            enrichers,
            concurrency: concurrency.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.enrichers.iter().map(|e| e.field()).collect()
    }

    /// Enrich every node of every document in place.
    ///
    /// `documents` holds one node list per source document. Returns the
    /// per-node failures; their fields are left unset.
    pub async fn run(&self, documents: &mut [Vec<Node>]) -> Vec<Error> {
        if self.enrichers.is_empty() {
            return Vec::new();
        }

        let prepared = self.prepare_all(documents).await;

        let jobs = {
            let documents = &*documents;
            let prepared = &prepared;
            let mut jobs = Vec::new();
            for (d, nodes) in documents.iter().enumerate() {
                for (n, node) in nodes.iter().enumerate() {
                    for (e, enricher) in self.enrichers.iter().enumerate() {
                        jobs.push(async move {
                            let result = match &prepared[d][e] {
                                Ok(value) => enricher.enrich(node, value.as_deref()).await,
                                Err(message) => Err(Error::llm(message.clone())),
                            };
                            (d, n, e, result)
                        });
                    }
                }
            }

            stream::iter(jobs)
                .buffer_unordered(self.concurrency)
                .collect::<Vec<_>>()
                .await
        };

        let mut failures = Vec::new();
        for (d, n, e, result) in jobs {
            let enricher = &self.enrichers[e];
            let node = &mut documents[d][n];
            match result {
                Ok(value) => node.set_metadata(enricher.field(), value, enricher.embedding_only()),
                Err(err) => {
                    let failure = Error::Enrichment {
                        enricher: enricher.field().to_string(),
                        node_id: node.id.clone(),
                        message: err.to_string(),
                    };
                    tracing::warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        failures
    }

    /// Document-level preparation, indexed `[document][enricher]`
    async fn prepare_all(
        &self,
        documents: &[Vec<Node>],
    ) -> Vec<Vec<std::result::Result<Option<String>, String>>> {
        let mut jobs = Vec::new();
        for (d, nodes) in documents.iter().enumerate() {
            for (e, enricher) in self.enrichers.iter().enumerate() {
                jobs.push(async move {
                    let result = enricher.prepare(nodes).await.map_err(|err| err.to_string());
                    (d, e, result)
                });
            }
        }

        let mut prepared: Vec<Vec<_>> = documents
            .iter()
            .map(|_| self.enrichers.iter().map(|_| Ok(None)).collect())
            .collect();

        let results: Vec<_> = stream::iter(jobs)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for (d, e, result) in results {
            prepared[d][e] = result;
        }
        prepared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::TextChunker;
    use crate::providers::mock::MockBackend;
    use crate::types::Document;

    fn config() -> EnrichmentConfig {
        EnrichmentConfig {
            titles: true,
            questions: true,
            compliance: true,
            title_nodes: 2,
            num_questions: 3,
            num_issues: 2,
            concurrency: 4,
        }
    }

    fn documents() -> Vec<Vec<Node>> {
        let chunker = TextChunker::new(16, 4).unwrap();
        vec![
            chunker.chunk_document(&Document::new("a.txt", "alpha bravo charlie delta echo foxtrot")),
            chunker.chunk_document(&Document::new("b.txt", "golf hotel")),
        ]
    }

    #[tokio::test]
    async fn test_all_fields_written() {
        let backend = Arc::new(MockBackend::new());
        let pipeline = EnrichmentPipeline::new(build_enrichers(&config(), backend), 4);
        let mut docs = documents();

        let failures = pipeline.run(&mut docs).await;
        assert!(failures.is_empty());

        for node in docs.iter().flatten() {
            assert!(node.metadata.contains_key("document_title"));
            assert!(node.metadata.contains_key("questions_this_excerpt_can_answer"));
            assert!(node.metadata.contains_key("compliance_issues"));
            assert!(!node.embedding_only_keys.contains("document_title"));
            assert!(node.embedding_only_keys.contains("compliance_issues"));
        }

        // Every node of one document shares the document title
        let titles: std::collections::HashSet<_> =
            docs[0].iter().map(|n| n.metadata["document_title"].clone()).collect();
        assert_eq!(titles.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_contained_to_one_node() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_complete_containing("golf hotel");
        let enrichers = build_enrichers(
            &EnrichmentConfig {
                titles: false,
                compliance: false,
                ..config()
            },
            backend,
        );
        let pipeline = EnrichmentPipeline::new(enrichers, 2);
        let mut docs = documents();

        let failures = pipeline.run(&mut docs).await;
        assert_eq!(failures.len(), 1);
        assert!(matches!(&failures[0], Error::Enrichment { enricher, .. }
            if enricher == "questions_this_excerpt_can_answer"));

        assert!(docs[0]
            .iter()
            .all(|n| n.metadata.contains_key("questions_this_excerpt_can_answer")));
        assert!(docs[1][0].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_no_enrichers_is_noop() {
        let pipeline = EnrichmentPipeline::new(Vec::new(), 1);
        let mut docs = documents();
        assert!(pipeline.run(&mut docs).await.is_empty());
        assert!(docs.iter().flatten().all(|n| n.metadata.is_empty()));
    }
}
