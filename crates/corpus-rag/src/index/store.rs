//! In-memory vector index over nodes

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::Node;

/// A search result: node plus cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub node: Node,
    pub score: f32,
}

/// Summary counts of an index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub nodes: usize,
    pub documents: usize,
    pub dimensions: usize,
}

/// Collection of embedded nodes with brute-force cosine search.
///
/// Nodes are kept in insertion order, which also breaks score ties.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    nodes: Vec<Node>,
    positions: HashMap<String, usize>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimensions` elements
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            nodes: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.positions.get(id).map(|&i| &self.nodes[i])
    }

    /// Append nodes.
    ///
    /// The whole batch is checked first, so a rejected batch leaves the
    /// index untouched. A duplicate id is fatal: ids are generated fresh and
    /// a collision means the generator is broken.
    pub fn insert(&mut self, nodes: Vec<Node>) -> Result<()> {
        let mut batch_ids = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if self.positions.contains_key(&node.id) || !batch_ids.insert(node.id.as_str()) {
                return Err(Error::fatal(format!("Node id collision: {}", node.id)));
            }
            match &node.embedding {
                Some(e) if e.len() == self.dimensions => {}
                Some(e) => {
                    return Err(Error::internal(format!(
                        "Node {} has embedding of length {}, expected {}",
                        node.id,
                        e.len(),
                        self.dimensions
                    )))
                }
                None => {
                    return Err(Error::internal(format!("Node {} has no embedding", node.id)))
                }
            }
        }

        for node in nodes {
            self.positions.insert(node.id.clone(), self.nodes.len());
            self.nodes.push(node);
        }
        Ok(())
    }

    /// The `k` nodes most similar to `query`, best first
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::invalid_config("k must be >= 1"));
        }

        let mut scored: Vec<(usize, f32)> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let score = node
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(query, e))
                    .unwrap_or(f32::NEG_INFINITY);
                (i, score)
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                node: self.nodes[i].clone(),
                score,
            })
            .collect())
    }

    /// Content hashes of every document with nodes in the index
    pub fn content_hashes(&self) -> HashSet<String> {
        self.nodes.iter().map(|n| n.content_hash.clone()).collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            nodes: self.nodes.len(),
            documents: self.content_hashes().len(),
            dimensions: self.dimensions,
        }
    }

    pub(crate) fn from_parts(dimensions: usize, nodes: Vec<Node>) -> Result<Self> {
        let mut index = Self::new(dimensions);
        index.insert(nodes)?;
        Ok(index)
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Shared handle to the current index.
///
/// Readers take a cheap snapshot; the synchronizer swaps in a new index only
/// after it has been persisted.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    current: Arc<RwLock<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    pub fn snapshot(&self) -> Arc<VectorIndex> {
        self.current.read().clone()
    }

    pub fn replace(&self, index: VectorIndex) {
        *self.current.write() = Arc::new(index);
    }
}
