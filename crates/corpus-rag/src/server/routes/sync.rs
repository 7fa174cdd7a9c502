//! Corpus sync endpoint

use axum::{extract::State, Json};

use crate::error::Result;
use crate::server::state::AppState;
use crate::sync::SyncReport;
use crate::types::SyncRequest;

/// POST /api/sync - Sync the configured corpus directory into the index
pub async fn sync_corpus(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>> {
    let corpus_dir = state.config().corpus.dir.clone();
    tracing::info!(
        "Sync requested for {} (force_reindex: {})",
        corpus_dir.display(),
        request.force_reindex
    );

    let report = state
        .synchronizer()
        .sync(state.index(), &corpus_dir, request.force_reindex)
        .await?;

    Ok(Json(report))
}
