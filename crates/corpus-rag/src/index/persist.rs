//! On-disk index format and atomic directory replacement
//!
//! Layout of a persisted index directory:
//! - `docstore.json`: nodes in insertion order
//! - `vectors.json`: node id to embedding
//! - `relationships.json`: node id to prev/next sibling ids
//! - `index_meta.json`: format version, dimension, node count, timestamp

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::embeddings::EmbeddingNormalizer;
use crate::error::{Error, Result};
use crate::types::Node;

use super::store::VectorIndex;

const FORMAT_VERSION: u32 = 1;
const DOCSTORE_FILE: &str = "docstore.json";
const VECTORS_FILE: &str = "vectors.json";
const RELATIONSHIPS_FILE: &str = "relationships.json";
const META_FILE: &str = "index_meta.json";

#[derive(Deserialize)]
struct DocStore {
    nodes: Vec<Node>,
}

#[derive(Serialize)]
struct DocStoreRef<'a> {
    nodes: &'a [Node],
}

#[derive(Serialize, Deserialize)]
struct VectorTable {
    embeddings: BTreeMap<String, Vec<f32>>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct Relationship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RelationshipTable {
    relationships: BTreeMap<String, Relationship>,
}

/// Metadata written alongside every persisted index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub dimensions: usize,
    pub node_count: usize,
    pub persisted_at: DateTime<Utc>,
}

/// Result of loading a persisted index
#[derive(Debug)]
pub struct LoadedIndex {
    pub index: VectorIndex,
    pub meta: IndexMeta,
    /// Nodes whose stored embedding had to be normalized again
    pub repaired: usize,
}

/// Whether a persisted index directory exists. Absence means "build fresh".
///
/// A previous index left aside by an interrupted persist is moved back first.
pub async fn index_exists(dir: &Path) -> Result<bool> {
    recover_interrupted(dir).await?;
    Ok(tokio::fs::try_exists(dir).await.unwrap_or(false))
}

/// Restore `.{name}.old` when a persist stopped between its two renames
async fn recover_interrupted(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }
    let backup = sibling(dir, "old");
    if !tokio::fs::try_exists(&backup).await.unwrap_or(false) {
        return Ok(());
    }

    tracing::warn!(
        "Restoring index from {} after an interrupted persist",
        backup.display()
    );
    tokio::fs::rename(&backup, dir).await.map_err(|e| {
        Error::persist(format!("Failed to restore {}: {}", backup.display(), e))
    })
}

impl VectorIndex {
    /// Write the index to `dir`, replacing any previous contents atomically.
    ///
    /// On failure the previous directory is left exactly as it was.
    pub async fn persist(&self, dir: &Path) -> Result<()> {
        let files = self.serialize_files()?;
        recover_interrupted(dir).await?;

        let staging = sibling(dir, "staging");
        let backup = sibling(dir, "old");

        if let Err(e) = write_staging(&staging, &files).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(Error::persist(format!(
                "Failed to write {}: {}",
                staging.display(),
                e
            )));
        }

        let had_previous = tokio::fs::try_exists(dir).await.unwrap_or(false);
        if had_previous {
            let _ = tokio::fs::remove_dir_all(&backup).await;
            if let Err(e) = tokio::fs::rename(dir, &backup).await {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(Error::persist(format!(
                    "Failed to move aside {}: {}",
                    dir.display(),
                    e
                )));
            }
        }

        if let Err(e) = tokio::fs::rename(&staging, dir).await {
            if had_previous {
                if let Err(restore) = tokio::fs::rename(&backup, dir).await {
                    tracing::error!(
                        "Failed to restore previous index from {}: {}",
                        backup.display(),
                        restore
                    );
                }
            }
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(Error::persist(format!(
                "Failed to install {}: {}",
                dir.display(),
                e
            )));
        }

        if had_previous {
            if let Err(e) = tokio::fs::remove_dir_all(&backup).await {
                tracing::warn!("Failed to remove old index {}: {}", backup.display(), e);
            }
        }

        tracing::info!("Persisted {} nodes to {}", self.len(), dir.display());
        Ok(())
    }

    /// Read an index from `dir`.
    ///
    /// Embeddings whose length differs from the normalizer's dimension, or
    /// that are missing from the vector table, are normalized again.
    pub async fn load(dir: &Path, normalizer: &EmbeddingNormalizer) -> Result<LoadedIndex> {
        recover_interrupted(dir).await?;
        let meta: IndexMeta = read_json(&dir.join(META_FILE)).await?;
        if meta.format_version != FORMAT_VERSION {
            return Err(Error::persist(format!(
                "Unsupported index format version {}",
                meta.format_version
            )));
        }

        let docstore: DocStore = read_json(&dir.join(DOCSTORE_FILE)).await?;
        let mut vectors: VectorTable = read_json(&dir.join(VECTORS_FILE)).await?;
        let mut relationships: RelationshipTable =
            read_json(&dir.join(RELATIONSHIPS_FILE)).await?;

        let mut repaired = 0;
        let mut nodes = docstore.nodes;
        for node in nodes.iter_mut() {
            let stored = vectors.embeddings.remove(&node.id);
            let normalized = normalizer.normalize(stored, &node.embedding_input());
            if normalized.repair.is_degraded() {
                tracing::warn!(
                    "Repaired embedding of node {} on load: {:?}",
                    node.id,
                    normalized.repair
                );
                repaired += 1;
            }
            node.embedding = Some(normalized.vector);

            if let Some(rel) = relationships.relationships.remove(&node.id) {
                node.prev_id = rel.prev;
                node.next_id = rel.next;
            }
        }

        let index = VectorIndex::from_parts(normalizer.dimensions(), nodes)?;
        tracing::info!(
            "Loaded {} nodes from {} ({} embeddings repaired)",
            index.len(),
            dir.display(),
            repaired
        );

        Ok(LoadedIndex {
            index,
            meta,
            repaired,
        })
    }

    fn serialize_files(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let docstore = DocStoreRef {
            nodes: self.nodes(),
        };

        let vectors = VectorTable {
            embeddings: self
                .nodes()
                .iter()
                .filter_map(|n| n.embedding.clone().map(|e| (n.id.clone(), e)))
                .collect(),
        };

        let relationships = RelationshipTable {
            relationships: self
                .nodes()
                .iter()
                .filter(|n| n.prev_id.is_some() || n.next_id.is_some())
                .map(|n| {
                    let rel = Relationship {
                        prev: n.prev_id.clone(),
                        next: n.next_id.clone(),
                    };
                    (n.id.clone(), rel)
                })
                .collect(),
        };

        let meta = IndexMeta {
            format_version: FORMAT_VERSION,
            dimensions: self.dimensions(),
            node_count: self.len(),
            persisted_at: Utc::now(),
        };

        Ok(vec![
            (DOCSTORE_FILE, serde_json::to_vec(&docstore)?),
            (VECTORS_FILE, serde_json::to_vec(&vectors)?),
            (RELATIONSHIPS_FILE, serde_json::to_vec_pretty(&relationships)?),
            (META_FILE, serde_json::to_vec_pretty(&meta)?),
        ])
    }
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!(".{}.{}", name, suffix))
}

async fn write_staging(staging: &Path, files: &[(&'static str, Vec<u8>)]) -> std::io::Result<()> {
    if tokio::fs::try_exists(staging).await? {
        tokio::fs::remove_dir_all(staging).await?;
    }
    tokio::fs::create_dir_all(staging).await?;
    for (name, bytes) in files {
        tokio::fs::write(staging.join(name), bytes).await?;
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::persist(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::persist(format!("Failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::TextChunker;
    use crate::types::Document;

    fn sample_index(dims: usize) -> VectorIndex {
        let chunker = TextChunker::new(8, 2).unwrap();
        let mut nodes = chunker.chunk_document(&Document::new("a.txt", "alpha bravo charlie delta"));
        nodes.extend(chunker.chunk_document(&Document::new("b.txt", "echo")));
        for (i, node) in nodes.iter_mut().enumerate() {
            node.set_metadata("document_title", format!("title {}", i), false);
            node.embedding = Some((0..dims).map(|d| (i * dims + d) as f32 * 0.25).collect());
        }

        let mut index = VectorIndex::new(dims);
        index.insert(nodes).unwrap();
        index
    }

    #[tokio::test]
    async fn test_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("storage");
        let index = sample_index(4);

        index.persist(&dir).await.unwrap();
        assert!(index_exists(&dir).await.unwrap());

        let loaded = VectorIndex::load(&dir, &EmbeddingNormalizer::new(4)).await.unwrap();
        assert_eq!(loaded.repaired, 0);
        assert_eq!(loaded.meta.node_count, index.len());
        assert_eq!(loaded.index, index);
    }

    #[tokio::test]
    async fn test_load_repairs_dimension_change() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("storage");
        let index = sample_index(4);
        index.persist(&dir).await.unwrap();

        let loaded = VectorIndex::load(&dir, &EmbeddingNormalizer::new(6)).await.unwrap();
        assert_eq!(loaded.repaired, index.len());
        assert!(loaded
            .index
            .nodes()
            .iter()
            .all(|n| n.embedding.as_ref().map(Vec::len) == Some(6)));
    }

    #[tokio::test]
    async fn test_persist_replaces_previous_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("storage");

        sample_index(4).persist(&dir).await.unwrap();
        let empty = VectorIndex::new(4);
        empty.persist(&dir).await.unwrap();

        let loaded = VectorIndex::load(&dir, &EmbeddingNormalizer::new(4)).await.unwrap();
        assert!(loaded.index.is_empty());

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["storage".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_previous_state() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("storage");
        let index = sample_index(4);
        index.persist(&dir).await.unwrap();

        // A plain file squatting on the staging path blocks the write
        std::fs::write(tmp.path().join(".storage.staging"), "not a dir").unwrap();
        let err = VectorIndex::new(4).persist(&dir).await.unwrap_err();
        assert!(matches!(err, Error::Persist(_)));

        let loaded = VectorIndex::load(&dir, &EmbeddingNormalizer::new(4)).await.unwrap();
        assert_eq!(loaded.index, index);
    }

    #[tokio::test]
    async fn test_index_set_aside_is_restored() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("storage");
        let index = sample_index(4);
        index.persist(&dir).await.unwrap();

        // State after the live directory was renamed aside but before staging was installed
        std::fs::rename(&dir, tmp.path().join(".storage.old")).unwrap();

        assert!(index_exists(&dir).await.unwrap());
        let loaded = VectorIndex::load(&dir, &EmbeddingNormalizer::new(4)).await.unwrap();
        assert_eq!(loaded.index, index);
    }

    #[tokio::test]
    async fn test_cancelled_persist_never_loses_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("storage");
        let old = sample_index(4);
        old.persist(&dir).await.unwrap();
        let new = VectorIndex::new(4);

        for micros in (0..3000).step_by(10) {
            let _ = tokio::time::timeout(
                std::time::Duration::from_micros(micros),
                new.persist(&dir),
            )
            .await;
            // A file operation already handed to the blocking pool still completes
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;

            assert!(index_exists(&dir).await.unwrap(), "index lost after {}us", micros);
            let loaded = VectorIndex::load(&dir, &EmbeddingNormalizer::new(4)).await.unwrap();
            assert!(loaded.index == old || loaded.index == new);

            old.persist(&dir).await.unwrap();
        }
    }
}
