//! Core types for the RAG system

pub mod document;
pub mod event;
pub mod query;

pub use document::{content_hash, Document, Node};
pub use event::StreamEvent;
pub use query::{ChatRequest, SyncRequest};
