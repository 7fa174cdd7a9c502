//! Corpus ingestion: directory scanning and chunking

mod chunker;
mod loader;

pub use chunker::{link_nodes, NodeIter, TextChunker};
pub use loader::CorpusLoader;
