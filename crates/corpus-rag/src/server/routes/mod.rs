//! API routes for the RAG server

pub mod chat;
pub mod index;
pub mod sync;

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Streaming answers
        .route("/chat/stream", post(chat::chat_stream))
        // Corpus synchronization
        .route("/sync", post(sync::sync_corpus))
        // Index inspection
        .route("/index/stats", get(index::index_stats))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "corpus-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Streaming retrieval-augmented answers over an incrementally synced corpus",
        "endpoints": {
            "POST /api/chat/stream": "Ask a question; answer streams as server-sent events",
            "POST /api/sync": "Sync the corpus directory into the index",
            "GET /api/index/stats": "Index size and backend connectivity"
        }
    }))
}
