//! Vector index and its persisted form

mod persist;
mod store;

pub use persist::{index_exists, IndexMeta, LoadedIndex};
pub use store::{cosine_similarity, IndexHandle, IndexStats, SearchHit, VectorIndex};
