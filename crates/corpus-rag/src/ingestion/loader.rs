//! Corpus directory scanning

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::CorpusConfig;
use crate::error::{Error, Result};
use crate::types::Document;

/// Reads every text document under a corpus directory
#[derive(Debug, Clone)]
pub struct CorpusLoader {
    extensions: Vec<String>,
    follow_links: bool,
}

impl CorpusLoader {
    pub fn new(config: &CorpusConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            follow_links: config.follow_links,
        }
    }

    /// Scan `root` and return its documents sorted by source id.
    ///
    /// Documents whose content was already seen earlier in the same scan are
    /// dropped, so each distinct content appears once.
    pub async fn load(&self, root: &Path) -> Result<Vec<Document>> {
        if !tokio::fs::try_exists(root).await.unwrap_or(false) {
            return Err(Error::MissingCorpusDir(root.to_path_buf()));
        }

        let paths = {
            let root = root.to_path_buf();
            let loader = self.clone();
            tokio::task::spawn_blocking(move || loader.collect_paths(&root))
                .await
                .map_err(|e| Error::internal(format!("Corpus scan task failed: {}", e)))?
        };

        let mut documents = Vec::with_capacity(paths.len());
        let mut seen = HashSet::new();

        for (path, source_id) in paths {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {}: {}", path.display(), e);
                    continue;
                }
            };
            let content = match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(_) => {
                    tracing::warn!("Skipping non-UTF-8 file: {}", path.display());
                    continue;
                }
            };

            let doc = Document::new(source_id, content);
            if !seen.insert(doc.content_hash.clone()) {
                tracing::debug!("Skipping duplicate content: {}", doc.source_id);
                continue;
            }
            documents.push(doc);
        }

        tracing::info!("Scanned {} documents in {}", documents.len(), root.display());
        Ok(documents)
    }

    /// Entries that cannot be walked are skipped with a warning
    fn collect_paths(&self, root: &Path) -> Vec<(PathBuf, String)> {
        let walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping corpus entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let source_id = relative.to_string_lossy().replace('\\', "/");
            paths.push((entry.into_path(), source_id));
        }

        paths.sort_by(|a, b| a.1.cmp(&b.1));
        paths
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn loader(extensions: &[&str]) -> CorpusLoader {
        CorpusLoader::new(&CorpusConfig {
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            ..CorpusConfig::default()
        })
    }

    #[tokio::test]
    async fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = loader(&[]).load(&missing).await.unwrap_err();
        assert!(matches!(err, Error::MissingCorpusDir(p) if p == missing));
    }

    #[tokio::test]
    async fn test_scan_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("b.txt"), "bravo").unwrap();
        fs::write(dir.path().join("sub/a.md"), "alpha").unwrap();
        fs::write(dir.path().join("c.bin"), [0xffu8, 0xfe, 0x00]).unwrap();
        fs::write(dir.path().join(".hidden.txt"), "hidden").unwrap();
        fs::write(dir.path().join(".git/config"), "git").unwrap();

        let docs = loader(&[]).load(dir.path()).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b.txt", "sub/a.md"]);

        let docs = loader(&["md"]).load(dir.path()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "alpha");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_entry_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.txt"), "still indexed").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("dangling.txt"))
            .unwrap();

        let loader = CorpusLoader::new(&CorpusConfig {
            follow_links: true,
            ..CorpusConfig::default()
        });
        let docs = loader.load(dir.path()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_id, "good.txt");
    }

    #[tokio::test]
    async fn test_identical_content_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "same").unwrap();
        fs::write(dir.path().join("copy.txt"), "same").unwrap();

        let docs = loader(&[]).load(dir.path()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_id, "a.txt");
    }
}
