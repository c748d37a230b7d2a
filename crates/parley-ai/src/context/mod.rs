//! Conversation context: transcript history, token accounting and the
//! summarization hand-off.

mod fallback;
mod manager;
mod tokens;
mod types;

pub use fallback::heuristic_summary;
pub use manager::ContextManager;
pub use tokens::estimate_tokens;
pub use types::{
    attribute, strip_attribution, ContextConfig, ContextSummary, ConversationMessage, EntryType,
    SummaryRequest, TranscriptPage,
};

#[cfg(test)]
mod tests;
