use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Role;

/// How an entry entered the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Ambient,
    Ptt,
    AiResponse,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    /// Stored content. User-origin text carries a `[speaker]: ` prefix.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub tokens: usize,
    pub entry_type: EntryType,
}

impl ConversationMessage {
    /// Content with any speaker attribution removed.
    pub fn text(&self) -> &str {
        strip_attribution(&self.content)
    }
}

/// Condensed replacement for a run of older messages. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub id: String,
    pub content: String,
    pub replaced_count: usize,
    pub original_tokens: usize,
    pub summary_tokens: usize,
    pub created_at: DateTime<Utc>,
}

/// One page of transcript history, oldest entry first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPage {
    pub entries: Vec<ConversationMessage>,
    pub summaries: Vec<ContextSummary>,
    pub has_more: bool,
    pub total_entries: usize,
}

/// A summarization handed out by the manager and awaiting completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub id: String,
    pub messages: Vec<ConversationMessage>,
    pub original_tokens: usize,
}

impl SummaryRequest {
    pub fn message_ids(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    pub max_messages: usize,
    pub max_tokens_before_summary: usize,
    pub target_tokens_after_summary: usize,
    pub chars_per_token: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_messages: 200,
            max_tokens_before_summary: 8000,
            target_tokens_after_summary: 2000,
            chars_per_token: 4,
        }
    }
}

pub fn attribute(speaker_name: &str, content: &str) -> String {
    format!("[{speaker_name}]: {content}")
}

/// Remove a leading `[speaker]: ` prefix, if present.
pub fn strip_attribution(content: &str) -> &str {
    if let Some(rest) = content.strip_prefix('[') {
        if let Some(end) = rest.find("]: ") {
            return &rest[end + 3..];
        }
    }
    content
}
