//! Upstream voice-AI and summarization configuration types.

use serde::{Deserialize, Serialize};

/// Realtime voice-AI link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub realtime_url: String,
    pub model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub voice: String,
    pub connect_timeout_secs: u64,
    /// Transcripts shorter than this (in characters) are treated as noise.
    pub min_transcript_chars: usize,
    /// Token budget for the recent-context block injected at turn start.
    pub context_token_budget: usize,
    pub sample_rate: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            realtime_url: "wss://api.openai.com/v1/realtime".into(),
            model: "gpt-4o-realtime-preview".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            voice: "alloy".into(),
            connect_timeout_secs: 10,
            min_transcript_chars: 5,
            context_token_budget: 2000,
            sample_rate: 24000,
        }
    }
}

/// Periodic and on-demand transcript summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    pub enabled: bool,
    /// Summarize once this many entries arrived since the last summary.
    pub entry_threshold: usize,
    /// Summarize once this many seconds passed since the last summary.
    pub interval_secs: u64,
    pub check_interval_secs: u64,
    /// Chat-completions endpoint. Empty means the heuristic summary is always used.
    pub llm_url: String,
    pub llm_model: String,
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_threshold: 50,
            interval_secs: 600,
            check_interval_secs: 30,
            llm_url: "https://api.openai.com/v1/chat/completions".into(),
            llm_model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            request_timeout_secs: 30,
        }
    }
}
