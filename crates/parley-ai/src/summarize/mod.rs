//! Condensing conversation history into structured summaries.

mod llm;
mod service;

pub use llm::{LlmSummarizer, LlmSummarizerConfig};
pub use service::{SummarizationMonitor, SummarizationPolicy, SummarizationService, SummaryTrigger};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ConversationMessage;
use crate::AiError;

/// Structured result of a summarization call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredSummary {
    pub summary: String,
    #[serde(default)]
    pub bullet_points: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
}

impl StructuredSummary {
    /// Flatten into the plain text stored in a context summary.
    pub fn render(&self) -> String {
        let mut out = self.summary.trim().to_string();
        for point in &self.bullet_points {
            out.push_str("\n- ");
            out.push_str(point);
        }
        if !self.topics.is_empty() {
            out.push_str("\nTopics: ");
            out.push_str(&self.topics.join(", "));
        }
        if !self.decisions.is_empty() {
            out.push_str("\nDecisions: ");
            out.push_str(&self.decisions.join("; "));
        }
        if !self.action_items.is_empty() {
            out.push_str("\nAction items: ");
            out.push_str(&self.action_items.join("; "));
        }
        out
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[ConversationMessage])
        -> Result<StructuredSummary, AiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_sections_that_are_present() {
        let s = StructuredSummary {
            summary: "Planned the launch.".into(),
            bullet_points: vec!["date is friday".into()],
            topics: vec!["launch".into(), "marketing".into()],
            decisions: vec![],
            action_items: vec!["Al drafts copy".into()],
        };
        assert_eq!(
            s.render(),
            "Planned the launch.\n- date is friday\nTopics: launch, marketing\nAction items: Al drafts copy"
        );
    }

    #[test]
    fn deserializes_camel_case_with_optional_lists() {
        let s: StructuredSummary =
            serde_json::from_str(r#"{"summary":"x","bulletPoints":["a"]}"#).unwrap();
        assert_eq!(s.bullet_points, vec!["a".to_string()]);
        assert!(s.topics.is_empty());
        assert!(s.action_items.is_empty());
    }
}
