//! Index inspection endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::index::IndexStats;
use crate::monitor::ConnectionState;
use crate::server::state::AppState;

#[derive(Serialize)]
pub struct IndexStatsResponse {
    #[serde(flatten)]
    pub index: IndexStats,
    pub storage_dir: String,
    pub backend: ConnectionState,
}

/// GET /api/index/stats - Index size and backend connectivity
pub async fn index_stats(State(state): State<AppState>) -> Json<IndexStatsResponse> {
    Json(IndexStatsResponse {
        index: state.index().snapshot().stats(),
        storage_dir: state.synchronizer().storage_dir().display().to_string(),
        backend: state.readiness().state(),
    })
}
