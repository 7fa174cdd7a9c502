//! Error types for the corpus RAG system

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG system errors
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected configuration (bad chunking parameters and similar)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Corpus directory does not exist
    #[error("Corpus directory not found: {}", .0.display())]
    MissingCorpusDir(PathBuf),

    /// Index could not be durably written; prior state is kept
    #[error("Failed to persist index: {0}")]
    Persist(String),

    /// Model backend not reachable within the readiness window
    #[error("Model backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single enricher failed for a single node
    #[error("Enricher '{enricher}' failed for node {node_id}: {message}")]
    Enrichment {
        enricher: String,
        node_id: String,
        message: String,
    },

    /// Unrecoverable condition (id collision, exhausted start-up retries)
    #[error("Fatal: {0}")]
    Fatal(String),

    /// Ollama/LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a persist error
    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a fatal error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the process can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Fatal(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "invalid_config"),
            Error::MissingCorpusDir(_) => (StatusCode::NOT_FOUND, "missing_corpus_dir"),
            Error::Persist(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persist_error"),
            Error::BackendUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
            }
            Error::Enrichment { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "enrichment_error"),
            Error::Fatal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "fatal"),
            Error::Llm(_) => (StatusCode::SERVICE_UNAVAILABLE, "llm_error"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_fatal_is_unrecoverable() {
        assert!(!Error::fatal("id collision").is_recoverable());
        assert!(Error::persist("disk full").is_recoverable());
        assert!(Error::MissingCorpusDir(PathBuf::from("docs")).is_recoverable());
    }

    #[test]
    fn test_status_mapping() {
        let resp = Error::BackendUnavailable("down".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = Error::MissingCorpusDir(PathBuf::from("docs")).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
