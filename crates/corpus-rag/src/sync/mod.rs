//! Incremental corpus-to-index synchronization
//!
//! A sync either rebuilds the index from the whole corpus or loads the
//! persisted index and processes only documents whose content is not yet
//! indexed. Identity is the content hash, never the file name.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingNormalizer;
use crate::enrichment::{Enricher, EnrichmentPipeline};
use crate::error::{Error, Result};
use crate::index::{index_exists, IndexHandle, VectorIndex};
use crate::ingestion::{CorpusLoader, TextChunker};
use crate::providers::ModelBackend;
use crate::types::{Document, Node};

/// How a sync built its index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Rebuilt from the whole corpus
    Fresh,
    /// Loaded the persisted index and added new documents
    Incremental,
}

/// Outcome of a sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Distinct documents found in the corpus
    pub documents_scanned: usize,
    /// Documents chunked and added in this run
    pub documents_indexed: usize,
    pub nodes_added: usize,
    pub total_nodes: usize,
    pub enrichment_failures: usize,
    /// Embeddings that were truncated, padded or substituted
    pub embeddings_repaired: usize,
    /// Whether the persisted index was rewritten
    pub persisted: bool,
    pub duration_ms: u64,
}

/// Orchestrates scan, chunking, enrichment, embedding and persistence.
///
/// Cheap to clone; clones share the sync lock.
#[derive(Clone)]
pub struct CorpusSynchronizer {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    loader: CorpusLoader,
    chunker: TextChunker,
    normalizer: EmbeddingNormalizer,
    enrichment: EnrichmentPipeline,
    backend: Arc<dyn ModelBackend>,
    storage_dir: PathBuf,
    embed_concurrency: usize,
    /// Serializes load-modify-persist sequences
    lock: Arc<Mutex<()>>,
}

impl CorpusSynchronizer {
    pub fn new(
        config: &RagConfig,
        backend: Arc<dyn ModelBackend>,
        enrichers: Vec<Arc<dyn Enricher>>,
    ) -> Result<Self> {
        let inner = SyncInner {
            loader: CorpusLoader::new(&config.corpus),
            chunker: TextChunker::from_config(&config.chunking)?,
            normalizer: EmbeddingNormalizer::new(config.embeddings.dimensions),
            enrichment: EnrichmentPipeline::new(enrichers, config.enrichment.concurrency),
            backend,
            storage_dir: config.index.storage_dir.clone(),
            embed_concurrency: config.embeddings.concurrency.max(1),
            lock: Arc::new(Mutex::new(())),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.inner.storage_dir
    }

    pub fn normalizer(&self) -> &EmbeddingNormalizer {
        &self.inner.normalizer
    }

    /// Load the persisted index if there is one, else start empty
    pub async fn open_index(&self) -> Result<VectorIndex> {
        let inner = &self.inner;
        let _guard = inner.lock.lock().await;
        if index_exists(&inner.storage_dir).await? {
            Ok(VectorIndex::load(&inner.storage_dir, &inner.normalizer).await?.index)
        } else {
            Ok(VectorIndex::new(inner.normalizer.dimensions()))
        }
    }

    /// Bring the persisted index in line with `corpus_dir`.
    ///
    /// `index` is swapped to the new state only after it was persisted; on any
    /// error both the handle and the on-disk index keep their prior state.
    /// The work runs on its own task: dropping the returned future does not
    /// interrupt a sync that already holds the lock.
    pub async fn sync(
        &self,
        index: &IndexHandle,
        corpus_dir: &Path,
        force_reindex: bool,
    ) -> Result<SyncReport> {
        let guard = self.inner.lock.clone().lock_owned().await;
        let inner = self.inner.clone();
        let index = index.clone();
        let corpus_dir = corpus_dir.to_path_buf();

        tokio::spawn(async move {
            let _guard = guard;
            inner.run(&index, &corpus_dir, force_reindex).await
        })
        .await
        .map_err(|e| Error::internal(format!("Sync task failed: {}", e)))?
    }
}

impl SyncInner {
    async fn run(
        &self,
        index: &IndexHandle,
        corpus_dir: &Path,
        force_reindex: bool,
    ) -> Result<SyncReport> {
        let started = Instant::now();

        if !tokio::fs::try_exists(corpus_dir).await.unwrap_or(false) {
            tracing::warn!("Corpus directory {} does not exist", corpus_dir.display());
            return Err(Error::MissingCorpusDir(corpus_dir.to_path_buf()));
        }

        let fresh = force_reindex || !index_exists(&self.storage_dir).await?;
        let (mut target, mut repaired, documents, scanned) = if fresh {
            tracing::info!("Building new index from {}", corpus_dir.display());
            let documents = self.loader.load(corpus_dir).await?;
            let scanned = documents.len();
            (VectorIndex::new(self.normalizer.dimensions()), 0, documents, scanned)
        } else {
            tracing::info!("Loading existing index from {}", self.storage_dir.display());
            let loaded = VectorIndex::load(&self.storage_dir, &self.normalizer).await?;
            let existing = loaded.index.content_hashes();
            let documents = self.loader.load(corpus_dir).await?;
            let scanned = documents.len();
            let new_documents: Vec<Document> = documents
                .into_iter()
                .filter(|doc| !existing.contains(&doc.content_hash))
                .collect();
            (loaded.index, loaded.repaired, new_documents, scanned)
        };

        let mode = if fresh { SyncMode::Fresh } else { SyncMode::Incremental };

        if !fresh && documents.is_empty() && repaired == 0 {
            tracing::info!("No new documents found. Index is up to date.");
            let total_nodes = target.len();
            index.replace(target);
            return Ok(SyncReport {
                mode,
                documents_scanned: scanned,
                documents_indexed: 0,
                nodes_added: 0,
                total_nodes,
                enrichment_failures: 0,
                embeddings_repaired: 0,
                persisted: false,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        if !fresh && !documents.is_empty() {
            tracing::info!("Found {} new documents. Updating index...", documents.len());
        }

        let mut per_document: Vec<Vec<Node>> = documents
            .iter()
            .map(|doc| self.chunker.chunk_document(doc))
            .collect();

        let failures = self.enrichment.run(&mut per_document).await;

        let mut nodes: Vec<Node> = per_document.into_iter().flatten().collect();
        repaired += self.embed_nodes(&mut nodes).await;

        let nodes_added = nodes.len();
        target.insert(nodes)?;
        target.persist(&self.storage_dir).await?;

        let report = SyncReport {
            mode,
            documents_scanned: scanned,
            documents_indexed: documents.len(),
            nodes_added,
            total_nodes: target.len(),
            enrichment_failures: failures.len(),
            embeddings_repaired: repaired,
            persisted: true,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        index.replace(target);

        tracing::info!(
            "Sync complete ({:?}): {} documents, {} nodes added, {} total",
            report.mode,
            report.documents_indexed,
            report.nodes_added,
            report.total_nodes
        );
        if report.embeddings_repaired > 0 || report.enrichment_failures > 0 {
            tracing::warn!(
                "Sync degraded: {} embeddings repaired, {} enrichment failures",
                report.embeddings_repaired,
                report.enrichment_failures
            );
        }

        Ok(report)
    }

    /// Embed nodes concurrently; returns how many needed repair
    async fn embed_nodes(&self, nodes: &mut [Node]) -> usize {
        let inputs: Vec<(usize, String, String)> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i, node.id.clone(), node.embedding_input()))
            .collect();

        let results: Vec<(usize, String, Option<Vec<f32>>)> = stream::iter(inputs)
            .map(|(i, id, input)| {
                let backend = self.backend.clone();
                async move {
                    match backend.embed(&input).await {
                        Ok(vector) => (i, input, Some(vector)),
                        Err(e) => {
                            tracing::warn!("Embedding failed for node {}: {}", id, e);
                            (i, input, None)
                        }
                    }
                }
            })
            .buffer_unordered(self.embed_concurrency)
            .collect()
            .await;

        let mut repaired = 0;
        for (i, input, raw) in results {
            let node = &mut nodes[i];
            let normalized = self.normalizer.normalize(raw, &input);
            if normalized.repair.is_degraded() {
                tracing::warn!(
                    "Degraded embedding for node {} ({}): {:?}",
                    node.id,
                    node.source_id,
                    normalized.repair
                );
                repaired += 1;
            }
            node.embedding = Some(normalized.vector);
        }
        repaired
    }
}
