//! Per-room conversation history under a token budget.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use parley_common::new_id;
use tracing::{debug, info, warn};

use super::fallback::heuristic_summary;
use super::tokens::estimate_tokens;
use super::types::{
    attribute, ContextConfig, ContextSummary, ConversationMessage, EntryType, SummaryRequest,
    TranscriptPage,
};
use crate::summarize::Summarizer;
use crate::{Message, Role};

pub struct ContextManager {
    config: ContextConfig,
    system_prompt: String,
    messages: VecDeque<ConversationMessage>,
    summaries: Vec<ContextSummary>,
    participants: HashMap<String, String>,
    total_tokens: usize,
    /// The single in-flight summarization, if any.
    pending: Option<String>,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            system_prompt: String::new(),
            messages: VecDeque::new(),
            summaries: Vec::new(),
            participants: HashMap::new(),
            total_tokens: 0,
            pending: None,
        }
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
        self.recompute_total();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_participant(&mut self, peer_id: &str, name: &str) {
        self.participants
            .insert(peer_id.to_string(), name.to_string());
    }

    pub fn remove_participant(&mut self, peer_id: &str) {
        self.participants.remove(peer_id);
    }

    pub fn participant_name(&self, peer_id: &str) -> Option<&str> {
        self.participants.get(peer_id).map(String::as_str)
    }

    // -- Appending ----------------------------------------------------------

    pub fn add_user_message(
        &mut self,
        speaker_id: &str,
        speaker_name: &str,
        content: &str,
    ) -> ConversationMessage {
        self.set_participant(speaker_id, speaker_name);
        self.push(
            Role::User,
            attribute(speaker_name, content),
            Some((speaker_id, speaker_name)),
            EntryType::Ptt,
        )
    }

    /// Speech overheard outside a PTT turn.
    pub fn add_ambient_message(
        &mut self,
        speaker_id: &str,
        speaker_name: &str,
        content: &str,
    ) -> ConversationMessage {
        self.set_participant(speaker_id, speaker_name);
        self.push(
            Role::User,
            attribute(speaker_name, content),
            Some((speaker_id, speaker_name)),
            EntryType::Ambient,
        )
    }

    pub fn add_assistant_message(&mut self, content: &str) -> ConversationMessage {
        self.push(Role::Assistant, content.to_string(), None, EntryType::AiResponse)
    }

    pub fn add_system_message(&mut self, content: &str) -> ConversationMessage {
        self.push(Role::System, content.to_string(), None, EntryType::System)
    }

    fn push(
        &mut self,
        role: Role,
        content: String,
        speaker: Option<(&str, &str)>,
        entry_type: EntryType,
    ) -> ConversationMessage {
        let tokens = estimate_tokens(&content, self.config.chars_per_token);
        let message = ConversationMessage {
            id: new_id(),
            role,
            content,
            speaker_id: speaker.map(|(id, _)| id.to_string()),
            speaker_name: speaker.map(|(_, name)| name.to_string()),
            timestamp: Utc::now(),
            tokens,
            entry_type,
        };
        self.messages.push_back(message.clone());
        self.total_tokens += tokens;

        while self.messages.len() > self.config.max_messages.max(1) {
            if let Some(evicted) = self.messages.pop_front() {
                self.total_tokens = self.total_tokens.saturating_sub(evicted.tokens);
                debug!(id = %evicted.id, "Evicted oldest context message");
            }
        }
        message
    }

    // -- Accounting ---------------------------------------------------------

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn summaries(&self) -> &[ContextSummary] {
        &self.summaries
    }

    pub fn needs_summarization(&self) -> bool {
        !self.messages.is_empty() && self.total_tokens > self.config.max_tokens_before_summary
    }

    pub fn is_summarizing(&self) -> bool {
        self.pending.is_some()
    }

    fn recompute_total(&mut self) {
        let cpt = self.config.chars_per_token;
        self.total_tokens = estimate_tokens(&self.system_prompt, cpt)
            + self.summaries.iter().map(|s| s.summary_tokens).sum::<usize>()
            + self.messages.iter().map(|m| m.tokens).sum::<usize>();
    }

    // -- Summarization ------------------------------------------------------

    /// Claim the oldest run of messages for condensation.
    ///
    /// Returns `None` while another summarization is in flight or when there
    /// is nothing to summarize. Messages are taken oldest-first until the next
    /// one would push the run past `ceiling - target`; at least one is taken.
    pub fn begin_summarization(&mut self) -> Option<SummaryRequest> {
        if let Some(id) = &self.pending {
            debug!(request = %id, "Summarization already in flight");
            return None;
        }
        if self.messages.is_empty() {
            return None;
        }

        let budget = self
            .config
            .max_tokens_before_summary
            .saturating_sub(self.config.target_tokens_after_summary);
        let mut taken = Vec::new();
        let mut original_tokens = 0;
        for message in &self.messages {
            if !taken.is_empty() && original_tokens + message.tokens > budget {
                break;
            }
            original_tokens += message.tokens;
            taken.push(message.clone());
        }

        let id = new_id();
        self.pending = Some(id.clone());
        debug!(request = %id, messages = taken.len(), original_tokens, "Summarization started");
        Some(SummaryRequest {
            id,
            messages: taken,
            original_tokens,
        })
    }

    /// Replace the messages claimed by `request_id` with one summary.
    ///
    /// Messages are matched by id, so anything evicted meanwhile is simply
    /// absent and anything appended meanwhile is kept.
    pub fn complete_summarization(
        &mut self,
        request: &SummaryRequest,
        content: String,
    ) -> Option<ContextSummary> {
        if self.pending.as_deref() != Some(request.id.as_str()) {
            warn!(request = %request.id, "Ignoring completion for unknown summarization");
            return None;
        }
        self.pending = None;

        let ids: HashSet<&str> = request.message_ids().collect();
        let before = self.messages.len();
        self.messages.retain(|m| !ids.contains(m.id.as_str()));
        let replaced_count = before - self.messages.len();
        if replaced_count == 0 {
            self.recompute_total();
            return None;
        }

        let summary = ContextSummary {
            id: new_id(),
            summary_tokens: estimate_tokens(&content, self.config.chars_per_token),
            content,
            replaced_count,
            original_tokens: request.original_tokens,
            created_at: Utc::now(),
        };
        self.summaries.push(summary.clone());
        self.recompute_total();
        info!(
            replaced = replaced_count,
            original_tokens = summary.original_tokens,
            summary_tokens = summary.summary_tokens,
            total_tokens = self.total_tokens,
            "Context summarized"
        );
        Some(summary)
    }

    pub fn abort_summarization(&mut self, request_id: &str) {
        if self.pending.as_deref() == Some(request_id) {
            self.pending = None;
        }
    }

    /// Claim, condense and replace in one call.
    ///
    /// Falls back to the heuristic summary when no summarizer is given or
    /// the summarizer fails.
    pub async fn summarize(
        &mut self,
        summarizer: Option<&dyn Summarizer>,
    ) -> Option<ContextSummary> {
        let request = self.begin_summarization()?;
        let structured = match summarizer {
            Some(s) => match s.summarize(&request.messages).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, "Summarizer failed; using heuristic summary");
                    heuristic_summary(&request.messages)
                }
            },
            None => heuristic_summary(&request.messages),
        };
        self.complete_summarization(&request, structured.render())
    }

    // -- Views --------------------------------------------------------------

    /// System prompt, then summaries, then raw messages, in order.
    pub fn get_messages_for_ai(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(1 + self.summaries.len() + self.messages.len());
        if !self.system_prompt.is_empty() {
            out.push(Message {
                role: Role::System,
                content: self.system_prompt.clone(),
            });
        }
        for summary in &self.summaries {
            out.push(Message {
                role: Role::System,
                content: format!("Summary of earlier conversation: {}", summary.content),
            });
        }
        for m in &self.messages {
            out.push(Message {
                role: m.role,
                content: m.content.clone(),
            });
        }
        out
    }

    /// Most recent messages that fit in `max_tokens`, in chronological order.
    ///
    /// When budget remains after the raw messages, the newest summary is
    /// prepended.
    pub fn recent_context(&self, max_tokens: usize) -> String {
        let mut used = 0;
        let mut lines: Vec<String> = Vec::new();
        for m in self.messages.iter().rev() {
            if used + m.tokens > max_tokens {
                break;
            }
            used += m.tokens;
            lines.push(match m.role {
                Role::Assistant => format!("[AI]: {}", m.content),
                _ => m.content.clone(),
            });
        }
        lines.reverse();
        if let Some(summary) = self.summaries.last() {
            if used + summary.summary_tokens <= max_tokens {
                lines.insert(0, format!("Earlier: {}", summary.content));
            }
        }
        lines.join("\n")
    }

    /// Page through history newest-first. `before` is an exclusive message id
    /// cursor; an unknown cursor yields an empty page.
    pub fn history(&self, limit: usize, before: Option<&str>) -> TranscriptPage {
        let end = match before {
            None => self.messages.len(),
            Some(id) => self
                .messages
                .iter()
                .position(|m| m.id == id)
                .unwrap_or(0),
        };
        let start = end.saturating_sub(limit);
        TranscriptPage {
            entries: self.messages.range(start..end).cloned().collect(),
            summaries: self.summaries.clone(),
            has_more: start > 0,
            total_entries: self.messages.len(),
        }
    }

    /// Drop everything; used when the room empties.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.summaries.clear();
        self.participants.clear();
        self.pending = None;
        self.recompute_total();
    }
}
