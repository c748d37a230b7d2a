//! AI engine for parley rooms.
//!
//! Provides:
//! - The upstream realtime voice-AI protocol and a WebSocket link
//! - Per-room conversation context with token accounting
//! - Summarizers (LLM-backed and heuristic) and the summarization monitor

pub mod audio;
pub mod context;
pub mod realtime;
pub mod summarize;

pub use context::{
    ContextConfig, ContextManager, ContextSummary, ConversationMessage, EntryType, SummaryRequest,
    TranscriptPage,
};
pub use realtime::{
    LinkEvent, LinkSender, RealtimeClientEvent, RealtimeConnector, RealtimeLink,
    RealtimeServerEvent, WsRealtimeConnector,
};
pub use summarize::{
    LlmSummarizer, LlmSummarizerConfig, StructuredSummary, SummarizationMonitor,
    SummarizationPolicy, SummarizationService, Summarizer, SummaryTrigger,
};

/// A message in the shape an upstream model consumes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Timeout")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Link closed")]
    Closed,
}
