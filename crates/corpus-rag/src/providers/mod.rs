//! Model backend abstraction and the Ollama implementation

mod backend;
mod connect;
#[cfg(test)]
pub(crate) mod mock;
mod ollama;

pub use backend::{FragmentStream, ModelBackend};
pub use connect::{acquire_backend, connect_with_backoff};
pub use ollama::{NdjsonDecoder, OllamaClient, StreamChunk};
