//! Prompt construction for answers and enrichment

mod prompt;

pub use prompt::PromptBuilder;
