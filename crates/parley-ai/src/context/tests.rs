use super::*;
use crate::summarize::{StructuredSummary, Summarizer};
use crate::{AiError, Role};
use async_trait::async_trait;

fn config(max_messages: usize, ceiling: usize, target: usize) -> ContextConfig {
    ContextConfig {
        max_messages,
        max_tokens_before_summary: ceiling,
        target_tokens_after_summary: target,
        chars_per_token: 4,
    }
}

fn sum_of_parts(ctx: &ContextManager) -> usize {
    estimate_tokens(ctx.system_prompt(), 4)
        + ctx.summaries().iter().map(|s| s.summary_tokens).sum::<usize>()
        + ctx.messages().map(|m| m.tokens).sum::<usize>()
}

#[test]
fn user_messages_are_attributed() {
    let mut ctx = ContextManager::new(ContextConfig::default());
    let m = ctx.add_user_message("p1", "Ada", "hello everyone");
    assert_eq!(m.content, "[Ada]: hello everyone");
    assert_eq!(m.text(), "hello everyone");
    assert_eq!(m.speaker_id.as_deref(), Some("p1"));
    assert_eq!(m.entry_type, EntryType::Ptt);
    assert_eq!(ctx.participant_name("p1"), Some("Ada"));
}

#[test]
fn transcript_round_trip_returns_original_text() {
    let mut ctx = ContextManager::new(ContextConfig::default());
    let original = "  spaces and [Ada]: lookalikes stay  ";
    let m = ctx.add_user_message("p1", "Ada", original);
    assert_eq!(strip_attribution(&m.content), original);
}

#[test]
fn assistant_and_system_are_not_attributed() {
    let mut ctx = ContextManager::new(ContextConfig::default());
    assert_eq!(ctx.add_assistant_message("sure").content, "sure");
    let sys = ctx.add_system_message("Bea joined");
    assert_eq!(sys.role, Role::System);
    assert_eq!(sys.entry_type, EntryType::System);
}

#[test]
fn tokens_follow_char_ratio() {
    let mut ctx = ContextManager::new(ContextConfig::default());
    // "[A]: " + 7 chars = 12 chars = 3 tokens
    let m = ctx.add_ambient_message("p", "A", "1234567");
    assert_eq!(m.tokens, 3);
    assert_eq!(m.entry_type, EntryType::Ambient);
    assert_eq!(ctx.total_tokens(), 3);
}

#[test]
fn cap_evicts_oldest_and_adjusts_tokens() {
    let mut ctx = ContextManager::new(config(2, 8000, 2000));
    let first = ctx.add_assistant_message("aaaa");
    ctx.add_assistant_message("bbbbbbbb");
    ctx.add_assistant_message("cc");
    assert_eq!(ctx.message_count(), 2);
    assert!(ctx.messages().all(|m| m.id != first.id));
    assert_eq!(ctx.total_tokens(), 2 + 1);
    assert_eq!(ctx.total_tokens(), sum_of_parts(&ctx));
}

#[test]
fn needs_summarization_above_ceiling() {
    let mut ctx = ContextManager::new(config(100, 10, 4));
    ctx.add_assistant_message(&"x".repeat(40));
    assert!(!ctx.needs_summarization());
    ctx.add_assistant_message("y");
    assert!(ctx.needs_summarization());
}

#[tokio::test]
async fn summarize_reduces_messages_and_keeps_token_equation() {
    let mut ctx = ContextManager::new(config(100, 20, 8));
    ctx.set_system_prompt("You are helpful.");
    for i in 0..10 {
        ctx.add_user_message("p1", "Al", &format!("point number {i}"));
    }
    assert!(ctx.needs_summarization());
    let before = ctx.message_count();

    let summary = ctx.summarize(None).await.unwrap();

    assert!(ctx.message_count() < before);
    assert_eq!(summary.replaced_count, before - ctx.message_count());
    assert_eq!(ctx.summaries().len(), 1);
    assert_eq!(ctx.total_tokens(), sum_of_parts(&ctx));
    assert!(!ctx.is_summarizing());
}

#[test]
fn greedy_walk_stops_before_budget_overflow() {
    // budget = 20 - 8 = 12 tokens; each message is "[Al]: " + 10 chars = 16 chars = 4 tokens
    let mut ctx = ContextManager::new(config(100, 20, 8));
    for _ in 0..6 {
        ctx.add_user_message("p1", "Al", "0123456789");
    }
    let req = ctx.begin_summarization().unwrap();
    assert_eq!(req.messages.len(), 3);
    assert_eq!(req.original_tokens, 12);
}

#[test]
fn oversized_first_message_is_still_taken() {
    let mut ctx = ContextManager::new(config(100, 10, 8));
    ctx.add_assistant_message(&"z".repeat(400));
    ctx.add_assistant_message("small");
    let req = ctx.begin_summarization().unwrap();
    assert_eq!(req.messages.len(), 1);
}

#[test]
fn second_summarization_while_pending_is_noop() {
    let mut ctx = ContextManager::new(config(100, 20, 8));
    for _ in 0..6 {
        ctx.add_user_message("p1", "Al", "0123456789");
    }
    let first = ctx.begin_summarization().unwrap();
    assert!(ctx.is_summarizing());
    assert!(ctx.begin_summarization().is_none());
    assert_eq!(ctx.message_count(), 6);

    ctx.complete_summarization(&first, "condensed".into()).unwrap();
    assert!(ctx.begin_summarization().is_some());
}

#[test]
fn completion_tolerates_concurrent_appends_and_evictions() {
    let mut ctx = ContextManager::new(config(5, 20, 8));
    for i in 0..5 {
        ctx.add_assistant_message(&format!("message {i:02}"));
    }
    let req = ctx.begin_summarization().unwrap();
    let claimed = req.messages.len();
    assert!(claimed >= 2);

    // One claimed message is evicted by a new arrival while the call runs.
    let newest = ctx.add_assistant_message("arrived late");
    let summary = ctx.complete_summarization(&req, "sum".into()).unwrap();

    assert_eq!(summary.replaced_count, claimed - 1);
    assert!(ctx.messages().any(|m| m.id == newest.id));
    assert_eq!(ctx.total_tokens(), sum_of_parts(&ctx));
}

#[test]
fn stale_completion_is_ignored() {
    let mut ctx = ContextManager::new(config(100, 20, 8));
    ctx.add_assistant_message("hello");
    let req = ctx.begin_summarization().unwrap();
    ctx.abort_summarization(&req.id);
    assert!(!ctx.is_summarizing());
    assert!(ctx.complete_summarization(&req, "late".into()).is_none());
    assert_eq!(ctx.message_count(), 1);
}

struct Echo;

#[async_trait]
impl Summarizer for Echo {
    async fn summarize(
        &self,
        messages: &[ConversationMessage],
    ) -> Result<StructuredSummary, AiError> {
        Ok(StructuredSummary {
            summary: format!("{} condensed", messages.len()),
            ..Default::default()
        })
    }
}

struct Broken;

#[async_trait]
impl Summarizer for Broken {
    async fn summarize(
        &self,
        _messages: &[ConversationMessage],
    ) -> Result<StructuredSummary, AiError> {
        Err(AiError::ApiError("HTTP 500".into()))
    }
}

#[tokio::test]
async fn summarize_uses_summarizer_output() {
    let mut ctx = ContextManager::new(config(100, 20, 8));
    ctx.add_assistant_message("one");
    ctx.add_assistant_message("two");
    let summary = ctx.summarize(Some(&Echo)).await.unwrap();
    assert_eq!(summary.content, "2 condensed");
}

#[tokio::test]
async fn summarize_falls_back_on_failure() {
    let mut ctx = ContextManager::new(config(100, 20, 8));
    ctx.add_user_message("p1", "Ada", "rockets rockets");
    let summary = ctx.summarize(Some(&Broken)).await.unwrap();
    assert!(summary.content.contains("Ada"));
    assert!(summary.content.contains("rockets"));
}

#[test]
fn messages_for_ai_are_ordered() {
    let mut ctx = ContextManager::new(config(100, 20, 8));
    ctx.set_system_prompt("sys");
    ctx.add_user_message("p1", "Al", "first");
    let req = ctx.begin_summarization().unwrap();
    ctx.complete_summarization(&req, "old stuff".into());
    ctx.add_assistant_message("reply");

    let out = ctx.get_messages_for_ai();
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].role, Role::System);
    assert_eq!(out[0].content, "sys");
    assert!(out[1].content.contains("old stuff"));
    assert_eq!(out[2].role, Role::Assistant);
}

#[test]
fn recent_context_is_newest_first_within_budget() {
    let mut ctx = ContextManager::new(ContextConfig::default());
    ctx.add_user_message("p1", "Al", &"a".repeat(40));
    ctx.add_user_message("p2", "Bo", "short");
    ctx.add_assistant_message("ok");

    let text = ctx.recent_context(5);
    assert_eq!(text, "[Bo]: short\n[AI]: ok");
    assert!(ctx.recent_context(0).is_empty());
}

#[test]
fn history_pages_backwards() {
    let mut ctx = ContextManager::new(ContextConfig::default());
    let ids: Vec<String> = (0..5)
        .map(|i| ctx.add_assistant_message(&format!("m{i}")).id)
        .collect();

    let page = ctx.history(2, None);
    assert_eq!(page.total_entries, 5);
    assert!(page.has_more);
    assert_eq!(page.entries[0].id, ids[3]);
    assert_eq!(page.entries[1].id, ids[4]);

    let page = ctx.history(2, Some(&ids[3]));
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.entries[0].id, ids[1]);
    assert!(page.has_more);

    let page = ctx.history(10, Some(&ids[1]));
    assert_eq!(page.entries.len(), 1);
    assert!(!page.has_more);

    let page = ctx.history(10, Some("missing"));
    assert!(page.entries.is_empty());
}

#[test]
fn clear_resets_everything() {
    let mut ctx = ContextManager::new(ContextConfig::default());
    ctx.add_user_message("p1", "Al", "hi");
    let _ = ctx.begin_summarization();
    ctx.clear();
    assert_eq!(ctx.message_count(), 0);
    assert!(!ctx.is_summarizing());
    assert!(ctx.participant_name("p1").is_none());
    assert_eq!(ctx.total_tokens(), 0);
}
