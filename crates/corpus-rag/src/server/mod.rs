//! HTTP server for the RAG system

pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use state::AppState;

/// RAG HTTP Server
pub struct RagServer {
    config: RagConfig,
    state: AppState,
}

impl RagServer {
    /// Create a server around already-wired application state
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config().clone(),
            state,
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let router = Router::new()
            // Health check
            .route("/health", get(health_check))
            .route("/ready", get(readiness))
            .nest("/api", routes::api_routes())
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::invalid_config(format!("Invalid address: {}", e)))?;

        let router = self.router();

        tracing::info!("Starting RAG server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::invalid_config(format!("Failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint: 503 unless the model backend is connected
async fn readiness(state: axum::extract::State<AppState>) -> axum::http::StatusCode {
    if state.is_ready() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexHandle, VectorIndex};
    use crate::monitor::ConnectivityMonitor;
    use crate::providers::mock::{MockBackend, Step};
    use std::path::Path;
    use std::sync::Arc;

    async fn spawn_server(backend: Arc<MockBackend>, root: &Path) -> (String, ConnectivityMonitor) {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 8;
        config.query.readiness_timeout_secs = Some(0);
        config.corpus.dir = root.join("documents");
        config.index.storage_dir = root.join("storage");

        let monitor = ConnectivityMonitor::new(backend.clone(), &config.monitor);
        monitor.probe_once().await;

        let state = AppState::new(
            config,
            backend,
            IndexHandle::new(VectorIndex::new(8)),
            monitor.signal(),
        )
        .unwrap();
        let router = RagServer::new(state).router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), monitor)
    }

    #[tokio::test]
    async fn test_chat_stream_serves_events() {
        let backend = Arc::new(MockBackend::new());
        backend.script(vec![Step::Text("The ca".into()), Step::Text("t sat".into())]);
        let tmp = tempfile::tempdir().unwrap();
        let (base, _monitor) = spawn_server(backend, tmp.path()).await;
        let client = reqwest::Client::new();

        assert_eq!(client.get(format!("{}/health", base)).send().await.unwrap().status(), 200);
        assert_eq!(client.get(format!("{}/ready", base)).send().await.unwrap().status(), 200);

        let body = client
            .post(format!("{}/api/chat/stream", base))
            .json(&serde_json::json!({"message": "what did the cat do"}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains(r#"data: {"type":"content","text":"The cat sat"}"#));
        assert!(body.contains(r#"data: {"type":"end"}"#));
    }

    #[tokio::test]
    async fn test_disconnected_backend_reported() {
        let backend = Arc::new(MockBackend::new());
        backend.set_healthy(false);
        let tmp = tempfile::tempdir().unwrap();
        let (base, _monitor) = spawn_server(backend, tmp.path()).await;
        let client = reqwest::Client::new();

        assert_eq!(client.get(format!("{}/ready", base)).send().await.unwrap().status(), 503);

        let stats: serde_json::Value = client
            .get(format!("{}/api/index/stats", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["backend"], "disconnected");
        assert_eq!(stats["nodes"], 0);

        let body = client
            .post(format!("{}/api/chat/stream", base))
            .json(&serde_json::json!({"message": "hello"}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body.matches("data: ").count(), 1);
        assert!(body.contains(r#""type":"error""#));
    }

    #[tokio::test]
    async fn test_sync_endpoint_indexes_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        let (base, _monitor) = spawn_server(Arc::new(MockBackend::new()), tmp.path()).await;
        let client = reqwest::Client::new();
        let sync = || {
            client
                .post(format!("{}/api/sync", base))
                .json(&serde_json::json!({"force_reindex": false}))
                .send()
        };

        let missing = sync().await.unwrap();
        assert_eq!(missing.status(), 404);
        assert!(!tmp.path().join("storage").exists());

        std::fs::create_dir_all(tmp.path().join("documents")).unwrap();
        std::fs::write(tmp.path().join("documents/a.txt"), "Payment is due in thirty days.").unwrap();

        let first: serde_json::Value = sync().await.unwrap().json().await.unwrap();
        assert_eq!(first["mode"], "fresh");
        assert_eq!(first["persisted"], true);
        let total = first["total_nodes"].as_u64().unwrap();
        assert!(total > 0);

        let stats: serde_json::Value = client
            .get(format!("{}/api/index/stats", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["nodes"].as_u64(), Some(total));

        let second: serde_json::Value = sync().await.unwrap().json().await.unwrap();
        assert_eq!(second["mode"], "incremental");
        assert_eq!(second["nodes_added"], 0);
        assert_eq!(second["persisted"], false);
    }
}
