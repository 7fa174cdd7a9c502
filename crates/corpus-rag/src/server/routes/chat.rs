//! Streaming chat endpoint

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;

use crate::server::state::AppState;
use crate::types::{ChatRequest, StreamEvent};

/// POST /api/chat/stream - Answer a question as server-sent events
///
/// Each event carries one JSON object `{"type": "content" | "end" | "error", "text"?}`.
/// The stream closes after the first `end` or `error`.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("Query: \"{}\"", request.message);

    let events = state.pipeline().query(request.message).map(|event| Ok(to_sse(&event)));

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize stream event: {}", e);
        Event::default().data(r#"{"type":"error","text":"serialization failure"}"#)
    })
}
