//! Configuration for the corpus RAG system

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main RAG system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Corpus location and scan rules
    pub corpus: CorpusConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Persisted index configuration
    pub index: IndexConfig,
    /// Metadata enrichment configuration
    pub enrichment: EnrichmentConfig,
    /// Query pipeline configuration
    pub query: QueryConfig,
    /// Connectivity monitor configuration
    pub monitor: MonitorConfig,
}

impl RagConfig {
    /// Parse a TOML configuration file. Missing sections take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: RagConfig = toml::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load from an optional file, apply environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RAG_OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Ok(dir) = std::env::var("RAG_CORPUS_DIR") {
            self.corpus.dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("RAG_INDEX_DIR") {
            self.index.storage_dir = PathBuf::from(dir);
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.embeddings.dimensions == 0 {
            return Err(Error::invalid_config("embeddings.dimensions must be > 0"));
        }
        if self.embeddings.concurrency == 0 {
            return Err(Error::invalid_config("embeddings.concurrency must be >= 1"));
        }
        if self.query.top_k == 0 {
            return Err(Error::invalid_config("query.top_k must be >= 1"));
        }
        if self.enrichment.concurrency == 0 {
            return Err(Error::invalid_config("enrichment.concurrency must be >= 1"));
        }
        if self.monitor.connect_attempts == 0 {
            return Err(Error::invalid_config("monitor.connect_attempts must be >= 1"));
        }
        if self.monitor.probe_interval_secs == 0 {
            return Err(Error::invalid_config("monitor.probe_interval_secs must be > 0"));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}

/// Corpus scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory holding the source documents
    pub dir: PathBuf,
    /// Lower-case extensions to include; empty means every readable text file
    pub extensions: Vec<String>,
    /// Follow symbolic links while scanning
    pub follow_links: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("documents"),
            extensions: Vec::new(),
            follow_links: false,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunk size in grapheme clusters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in grapheme clusters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 128,
        }
    }
}

impl ChunkingConfig {
    /// Overlap must be strictly smaller than the chunk size
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunking.chunk_size must be > 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::invalid_config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Process-wide embedding dimension every stored vector is coerced to
    pub dimensions: usize,
    /// Parallel embedding requests during a sync
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            concurrency: num_cpus::get().min(8),
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed unary requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "llama3.2:3b".to_string(),
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Persisted index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory the serialized index lives in; absence means "build fresh"
    pub storage_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage"),
        }
    }
}

/// Metadata enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Run the title extractor
    pub titles: bool,
    /// Run the questions-answered extractor
    pub questions: bool,
    /// Run the compliance checker
    pub compliance: bool,
    /// Leading nodes of a document that feed its title
    pub title_nodes: usize,
    /// Questions generated per node
    pub num_questions: usize,
    /// Compliance issues to look for per node
    pub num_issues: usize,
    /// Concurrent enrichment calls
    pub concurrency: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            titles: true,
            questions: true,
            compliance: false,
            title_nodes: 5,
            num_questions: 5,
            num_issues: 5,
            concurrency: num_cpus::get().min(8),
        }
    }
}

/// Query pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Nodes retrieved as generation context
    pub top_k: usize,
    /// Readiness wait before a query gives up; `None` waits indefinitely
    pub readiness_timeout_secs: Option<u64>,
    /// Upper bound on text held back while waiting for a natural break
    pub max_buffer_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            readiness_timeout_secs: Some(10),
            max_buffer_chars: 1024,
        }
    }
}

impl QueryConfig {
    /// Readiness timeout as a duration
    pub fn readiness_timeout(&self) -> Option<Duration> {
        self.readiness_timeout_secs.map(Duration::from_secs)
    }
}

/// Connectivity monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between background health probes
    pub probe_interval_secs: u64,
    /// Timeout of a single probe in seconds
    pub probe_timeout_secs: u64,
    /// Attempts of the start-up connection routine
    pub connect_attempts: u32,
    /// First back-off delay of the start-up routine; doubles per attempt
    pub connect_base_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 5,
            probe_timeout_secs: 3,
            connect_attempts: 5,
            connect_base_delay_ms: 500,
        }
    }
}

impl MonitorConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 128);
        assert_eq!(config.query.top_k, 10);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let chunking = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
        };
        assert!(matches!(chunking.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RagConfig = toml::from_str(
            r#"
            [chunking]
            chunk_size = 256
            chunk_overlap = 32

            [query]
            top_k = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size, 256);
        assert_eq!(config.query.top_k, 4);
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.index.storage_dir, PathBuf::from("storage"));
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.toml");
        std::fs::write(&path, "chunking = 12").unwrap();
        assert!(matches!(RagConfig::from_file(&path), Err(Error::InvalidConfig(_))));
    }
}
