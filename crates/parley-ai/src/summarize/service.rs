//! Summarization triggers and the fault-tolerant summarize call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{StructuredSummary, Summarizer};
use crate::context::{heuristic_summary, ConversationMessage};
use crate::AiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizationPolicy {
    pub enabled: bool,
    pub entry_threshold: usize,
    pub interval: Duration,
}

impl Default for SummarizationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_threshold: 50,
            interval: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryTrigger {
    EntryCount(usize),
    Elapsed(Duration),
}

/// Tracks entries and time since the last summary for one room.
#[derive(Debug)]
pub struct SummarizationMonitor {
    policy: SummarizationPolicy,
    entries_since_last: usize,
    last_summary_at: Instant,
}

impl SummarizationMonitor {
    pub fn new(policy: SummarizationPolicy, now: Instant) -> Self {
        Self {
            policy,
            entries_since_last: 0,
            last_summary_at: now,
        }
    }

    pub fn record_entry(&mut self) {
        self.entries_since_last += 1;
    }

    pub fn entries_since_last(&self) -> usize {
        self.entries_since_last
    }

    /// Evaluated on each check tick. Either threshold fires independently;
    /// elapsed time only counts when there is something new to condense.
    pub fn should_summarize(&self, now: Instant) -> Option<SummaryTrigger> {
        if !self.policy.enabled || self.entries_since_last == 0 {
            return None;
        }
        if self.entries_since_last >= self.policy.entry_threshold {
            return Some(SummaryTrigger::EntryCount(self.entries_since_last));
        }
        let elapsed = now.saturating_duration_since(self.last_summary_at);
        if elapsed >= self.policy.interval {
            return Some(SummaryTrigger::Elapsed(elapsed));
        }
        None
    }

    pub fn mark_summarized(&mut self, now: Instant) {
        self.entries_since_last = 0;
        self.last_summary_at = now;
    }
}

type ErrorHook = Arc<dyn Fn(&AiError) + Send + Sync>;

/// Runs a summarizer and never fails: errors go to the hook and the
/// heuristic summary is returned instead.
#[derive(Clone, Default)]
pub struct SummarizationService {
    summarizer: Option<Arc<dyn Summarizer>>,
    on_error: Option<ErrorHook>,
}

impl SummarizationService {
    pub fn new(summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self {
            summarizer,
            on_error: None,
        }
    }

    pub fn with_error_hook(mut self, hook: impl Fn(&AiError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn has_summarizer(&self) -> bool {
        self.summarizer.is_some()
    }

    pub async fn summarize(&self, messages: &[ConversationMessage]) -> StructuredSummary {
        let Some(summarizer) = &self.summarizer else {
            return heuristic_summary(messages);
        };
        match summarizer.summarize(messages).await {
            Ok(summary) => {
                info!(messages = messages.len(), "LLM summary produced");
                summary
            }
            Err(e) => {
                warn!(error = %e, "Summarization failed; falling back to heuristic summary");
                if let Some(hook) = &self.on_error {
                    hook(&e);
                }
                heuristic_summary(messages)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    #[async_trait]
    impl Summarizer for Failing {
        async fn summarize(
            &self,
            _messages: &[ConversationMessage],
        ) -> Result<StructuredSummary, AiError> {
            Err(AiError::RateLimited)
        }
    }

    struct Fixed;

    #[async_trait]
    impl Summarizer for Fixed {
        async fn summarize(
            &self,
            _messages: &[ConversationMessage],
        ) -> Result<StructuredSummary, AiError> {
            Ok(StructuredSummary {
                summary: "fixed".into(),
                ..Default::default()
            })
        }
    }

    fn policy(threshold: usize, interval_secs: u64) -> SummarizationPolicy {
        SummarizationPolicy {
            enabled: true,
            entry_threshold: threshold,
            interval: Duration::from_secs(interval_secs),
        }
    }

    #[test]
    fn count_threshold_fires() {
        let start = Instant::now();
        let mut m = SummarizationMonitor::new(policy(3, 600), start);
        m.record_entry();
        m.record_entry();
        assert_eq!(m.should_summarize(start), None);
        m.record_entry();
        assert_eq!(m.should_summarize(start), Some(SummaryTrigger::EntryCount(3)));
    }

    #[test]
    fn elapsed_threshold_fires_independently() {
        let start = Instant::now();
        let mut m = SummarizationMonitor::new(policy(100, 10), start);
        m.record_entry();
        let later = start + Duration::from_secs(11);
        assert!(matches!(
            m.should_summarize(later),
            Some(SummaryTrigger::Elapsed(_))
        ));
    }

    #[test]
    fn nothing_new_means_no_trigger() {
        let start = Instant::now();
        let m = SummarizationMonitor::new(policy(1, 1), start);
        assert_eq!(m.should_summarize(start + Duration::from_secs(60)), None);
    }

    #[test]
    fn mark_resets_both_thresholds() {
        let start = Instant::now();
        let mut m = SummarizationMonitor::new(policy(1, 10), start);
        m.record_entry();
        let later = start + Duration::from_secs(20);
        m.mark_summarized(later);
        assert_eq!(m.entries_since_last(), 0);
        m.record_entry();
        assert_eq!(m.should_summarize(later), Some(SummaryTrigger::EntryCount(1)));
    }

    #[test]
    fn disabled_never_fires() {
        let start = Instant::now();
        let mut p = policy(1, 1);
        p.enabled = false;
        let mut m = SummarizationMonitor::new(p, start);
        m.record_entry();
        assert_eq!(m.should_summarize(start + Duration::from_secs(5)), None);
    }

    #[tokio::test]
    async fn failure_falls_back_and_reports() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let service = SummarizationService::new(Some(Arc::new(Failing)))
            .with_error_hook(move |e| {
                assert!(matches!(e, AiError::RateLimited));
                seen.fetch_add(1, Ordering::SeqCst);
            });
        let summary = service.summarize(&[]).await;
        assert!(summary.summary.contains("0 messages"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_passes_through() {
        let service = SummarizationService::new(Some(Arc::new(Fixed)));
        assert_eq!(service.summarize(&[]).await.summary, "fixed");
    }

    #[tokio::test]
    async fn no_summarizer_uses_heuristic() {
        let service = SummarizationService::default();
        assert!(!service.has_summarizer());
        assert!(service.summarize(&[]).await.summary.starts_with("Earlier conversation"));
    }
}
