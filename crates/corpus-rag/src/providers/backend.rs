//! Model backend abstraction

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Lazy sequence of raw generated text fragments. Fragments may split words.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Network boundary to the embedding and generation models
///
/// Implementations:
/// - `OllamaClient`: local or remote Ollama server
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Single-shot completion, used by the metadata enrichers
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Start a streamed generation. Dropping the stream releases the request.
    async fn generate(&self, prompt: &str) -> Result<FragmentStream>;

    /// Lightweight reachability probe
    async fn health_check(&self) -> Result<bool>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
