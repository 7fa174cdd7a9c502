//! Embedding post-processing

mod normalizer;

pub use normalizer::{EmbeddingNormalizer, Normalized, Repair};
