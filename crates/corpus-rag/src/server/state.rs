//! Application state for the RAG server

use std::sync::Arc;

use crate::config::RagConfig;
use crate::enrichment::build_enrichers;
use crate::error::Result;
use crate::index::IndexHandle;
use crate::monitor::ReadinessSignal;
use crate::providers::ModelBackend;
use crate::query::QueryPipeline;
use crate::sync::CorpusSynchronizer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Model backend shared by sync and queries
    backend: Arc<dyn ModelBackend>,
    /// Current index; the synchronizer is its only writer
    index: IndexHandle,
    /// Corpus synchronizer
    synchronizer: CorpusSynchronizer,
    /// Query pipeline
    pipeline: QueryPipeline,
    /// Backend connectivity as seen by the monitor
    readiness: ReadinessSignal,
}

impl AppState {
    /// Wire the core components around an acquired backend and a loaded index
    pub fn new(
        config: RagConfig,
        backend: Arc<dyn ModelBackend>,
        index: IndexHandle,
        readiness: ReadinessSignal,
    ) -> Result<Self> {
        let enrichers = build_enrichers(&config.enrichment, backend.clone());
        tracing::info!(
            "Enrichers: {}",
            enrichers.iter().map(|e| e.field()).collect::<Vec<_>>().join(", ")
        );

        let synchronizer = CorpusSynchronizer::new(&config, backend.clone(), enrichers)?;
        let pipeline = QueryPipeline::new(backend.clone(), index.clone(), readiness.clone(), &config);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                index,
                synchronizer,
                pipeline,
                readiness,
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Get the model backend
    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.inner.backend
    }

    /// Get the index handle
    pub fn index(&self) -> &IndexHandle {
        &self.inner.index
    }

    /// Get the corpus synchronizer
    pub fn synchronizer(&self) -> &CorpusSynchronizer {
        &self.inner.synchronizer
    }

    /// Get the query pipeline
    pub fn pipeline(&self) -> &QueryPipeline {
        &self.inner.pipeline
    }

    /// Get the readiness signal
    pub fn readiness(&self) -> &ReadinessSignal {
        &self.inner.readiness
    }

    /// Check if the server is ready to answer queries
    pub fn is_ready(&self) -> bool {
        self.inner.readiness.is_connected()
    }
}
