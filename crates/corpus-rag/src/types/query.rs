//! Request types for the HTTP surface

use serde::{Deserialize, Serialize};

/// Chat message sent to the streaming endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question
    pub message: String,
}

/// Sync trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Discard the persisted index and rebuild from scratch
    #[serde(default)]
    pub force_reindex: bool,
}
