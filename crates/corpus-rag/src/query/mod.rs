//! Streaming question answering over the index

mod pipeline;
mod rebuffer;

pub use pipeline::QueryPipeline;
pub use rebuffer::Rebuffer;
