//! Streaming retrieval-augmented query pipeline

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingNormalizer;
use crate::error::Result;
use crate::generation::PromptBuilder;
use crate::index::{IndexHandle, SearchHit};
use crate::monitor::ReadinessSignal;
use crate::providers::ModelBackend;
use crate::types::StreamEvent;

use super::rebuffer::Rebuffer;

/// Answers questions from the index as a stream of events.
///
/// Cheap to clone; every query stream owns its own clones of the shared parts.
#[derive(Clone)]
pub struct QueryPipeline {
    backend: Arc<dyn ModelBackend>,
    index: IndexHandle,
    readiness: ReadinessSignal,
    normalizer: EmbeddingNormalizer,
    top_k: usize,
    readiness_timeout: Option<Duration>,
    max_buffer_chars: usize,
}

impl QueryPipeline {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        index: IndexHandle,
        readiness: ReadinessSignal,
        config: &RagConfig,
    ) -> Self {
        Self {
            backend,
            index,
            readiness,
            normalizer: EmbeddingNormalizer::new(config.embeddings.dimensions),
            top_k: config.query.top_k.max(1),
            readiness_timeout: config.query.readiness_timeout(),
            max_buffer_chars: config.query.max_buffer_chars,
        }
    }

    /// Embed `question` and return the closest nodes, best first
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>> {
        let raw = match self.backend.embed(question).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!("Query embedding failed, using fallback vector: {}", e);
                None
            }
        };

        let normalized = self.normalizer.normalize(raw, question);
        if normalized.repair.is_degraded() {
            tracing::warn!("Degraded query embedding: {:?}", normalized.repair);
        }

        self.index
            .snapshot()
            .similarity_search(&normalized.vector, self.top_k)
    }

    /// Answer `question` as a finite, single-use stream.
    ///
    /// The stream always ends with exactly one `End` or one `Error` event.
    /// Dropping it early drops the backend generation with it.
    pub fn query(&self, question: impl Into<String>) -> BoxStream<'static, StreamEvent> {
        let pipeline = self.clone();
        let question = question.into();

        let stream = async_stream::stream! {
            if let Err(e) = pipeline.readiness.wait_ready(pipeline.readiness_timeout).await {
                tracing::warn!("Query rejected: {}", e);
                yield StreamEvent::error(e.to_string());
                return;
            }

            let hits = match pipeline.retrieve(&question).await {
                Ok(hits) => hits,
                Err(e) => {
                    yield StreamEvent::error(e.to_string());
                    return;
                }
            };
            tracing::debug!("Retrieved {} nodes for query", hits.len());

            let context = PromptBuilder::build_context(&hits);
            let prompt = PromptBuilder::build_qa_prompt(&question, &context);

            let mut fragments = match pipeline.backend.generate(&prompt).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    tracing::warn!("Generation failed to start: {}", e);
                    yield StreamEvent::error(e.to_string());
                    return;
                }
            };

            let mut rebuffer = Rebuffer::new(pipeline.max_buffer_chars);
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(fragment) => {
                        if let Some(unit) = rebuffer.push(&fragment) {
                            yield StreamEvent::content(unit);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Generation failed mid-stream: {}", e);
                        yield StreamEvent::error(e.to_string());
                        return;
                    }
                }
            }

            if let Some(rest) = rebuffer.finish() {
                yield StreamEvent::content(rest);
            }
            yield StreamEvent::End;
        };

        stream.boxed()
    }
}
