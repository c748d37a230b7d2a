//! Chat-completions backed summarizer.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{StructuredSummary, Summarizer};
use crate::context::ConversationMessage;
use crate::{AiError, Role};

const SYSTEM_PROMPT: &str = "You summarize multi-party voice conversations. \
Reply with a single JSON object of the form \
{\"summary\": string, \"bulletPoints\": string[], \"topics\": string[], \
\"decisions\": string[], \"actionItems\": string[]}. \
Keep the summary under 120 words, attribute statements to speakers by name, \
and leave lists empty rather than inventing content.";

#[derive(Debug, Clone)]
pub struct LlmSummarizerConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

pub struct LlmSummarizer {
    config: LlmSummarizerConfig,
    http: reqwest::Client,
}

impl LlmSummarizer {
    pub fn new(config: LlmSummarizerConfig) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AiError::NetworkError(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub(crate) fn build_request_body(&self, messages: &[ConversationMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "temperature": 0.3,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": transcript_for_prompt(messages) },
            ],
        })
    }
}

/// One line per message, `Speaker: text`.
pub(crate) fn transcript_for_prompt(messages: &[ConversationMessage]) -> String {
    let mut out = String::from("Transcript:\n");
    for m in messages {
        let speaker = match (&m.speaker_name, m.role) {
            (Some(name), _) => name.as_str(),
            (None, Role::Assistant) => "AI",
            (None, _) => "System",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(m.text());
        out.push('\n');
    }
    out
}

/// Pull the structured summary out of a chat-completions response.
pub(crate) fn parse_completion(json: &serde_json::Value) -> Result<StructuredSummary, AiError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| AiError::ParseError("completion has no message content".into()))?;
    let summary: StructuredSummary = serde_json::from_str(content.trim())
        .map_err(|e| AiError::ParseError(format!("summary is not valid JSON: {e}")))?;
    if summary.summary.trim().is_empty() {
        return Err(AiError::ParseError("summary text is empty".into()));
    }
    Ok(summary)
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        messages: &[ConversationMessage],
    ) -> Result<StructuredSummary, AiError> {
        let body = self.build_request_body(messages);

        debug!(model = %self.config.model, messages = messages.len(), "Summarization request");

        let response = self
            .http
            .post(&self.config.url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AiError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            return Err(AiError::ApiError(format!("HTTP {status}: {text}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AiError::ParseError(e.to_string()))?;

        parse_completion(&json)
    }
}
