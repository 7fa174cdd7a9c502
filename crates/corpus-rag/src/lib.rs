//! corpus-rag: incremental corpus indexing and streaming retrieval-augmented answers
//!
//! Two subsystems make up the core:
//! - the corpus synchronizer ([`sync`]) turns a directory of documents into a
//!   persisted, embedded, relationship-linked index and only processes new
//!   content on repeated runs;
//! - the query pipeline ([`query`]) embeds a question, retrieves the closest
//!   nodes and streams a generated answer while tolerating a flaky backend.
//!
//! The model backend (Ollama) sits behind the [`providers::ModelBackend`] trait.

pub mod config;
pub mod embeddings;
pub mod enrichment;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod monitor;
pub mod providers;
pub mod query;
pub mod server;
pub mod sync;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use index::{IndexHandle, VectorIndex};
pub use query::QueryPipeline;
pub use sync::{CorpusSynchronizer, SyncReport};
pub use types::{Document, Node, StreamEvent};
