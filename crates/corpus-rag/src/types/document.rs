//! Document and node types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A raw source document read from the corpus.
///
/// Documents are never persisted; only the nodes chunked out of them are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identity of the source (path relative to the corpus root)
    pub source_id: String,
    /// Full text content
    pub content: String,
    /// SHA-256 of the content, hex encoded
    pub content_hash: String,
}

impl Document {
    /// Create a document, deriving its content hash
    pub fn new(source_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let content_hash = content_hash(&content);
        Self {
            source_id: source_id.into(),
            content,
            content_hash,
        }
    }
}

/// Hash text content for change detection
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A chunk of a document plus everything derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique node ID
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Annotator name -> value
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Metadata keys hidden from the generation context
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub embedding_only_keys: BTreeSet<String>,
    /// Embedding vector, absent until the node is embedded
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Previous node of the same document
    #[serde(skip)]
    pub prev_id: Option<String>,
    /// Next node of the same document
    #[serde(skip)]
    pub next_id: Option<String>,
    /// Source document identity
    pub source_id: String,
    /// Content hash of the source document
    pub content_hash: String,
    /// Position within the source document's chunk sequence
    pub chunk_index: u32,
    /// Grapheme offset of the chunk start within the document
    pub char_start: usize,
}

impl Node {
    /// Create an unlinked, unembedded node with a fresh id
    pub fn new(doc: &Document, text: String, chunk_index: u32, char_start: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text,
            metadata: BTreeMap::new(),
            embedding_only_keys: BTreeSet::new(),
            embedding: None,
            prev_id: None,
            next_id: None,
            source_id: doc.source_id.clone(),
            content_hash: doc.content_hash.clone(),
            chunk_index,
            char_start,
        }
    }

    /// Store a metadata field
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>, embedding_only: bool) {
        let key = key.into();
        if embedding_only {
            self.embedding_only_keys.insert(key.clone());
        } else {
            self.embedding_only_keys.remove(&key);
        }
        self.metadata.insert(key, value.into());
    }

    /// Text sent to the embedding model: every metadata field, then the chunk
    pub fn embedding_input(&self) -> String {
        self.render(|_| true)
    }

    /// Text used as generation context: metadata minus embedding-only fields
    pub fn llm_input(&self) -> String {
        self.render(|key| !self.embedding_only_keys.contains(key))
    }

    fn render(&self, include: impl Fn(&str) -> bool) -> String {
        let header: Vec<String> = self
            .metadata
            .iter()
            .filter(|(k, _)| include(k))
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();

        if header.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", header.join("\n"), self.text)
        }
    }
}
