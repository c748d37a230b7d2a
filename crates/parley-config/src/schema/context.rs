//! Conversation context and token-budget configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
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
