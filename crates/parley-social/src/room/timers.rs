//! Cancelable timers that fire into a room's command queue.
//!
//! A fired timer only takes effect if it is still armed when its message is
//! processed: cancelling removes it from the table, so a firing that was
//! already queued is recognised as stale and ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    ConnectTimeout { link_id: u64 },
    BroadcastWait { response_id: String },
    SummaryCheck,
    PresenceSweep,
}

struct Armed {
    kind: TimerKind,
    handle: JoinHandle<()>,
}

pub struct Timers<C> {
    tx: mpsc::UnboundedSender<C>,
    wrap: fn(TimerId) -> C,
    next_id: u64,
    armed: HashMap<TimerId, Armed>,
}

impl<C: Send + 'static> Timers<C> {
    pub fn new(tx: mpsc::UnboundedSender<C>, wrap: fn(TimerId) -> C) -> Self {
        Self {
            tx,
            wrap,
            next_id: 0,
            armed: HashMap::new(),
        }
    }

    pub fn arm(&mut self, kind: TimerKind, after: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let tx = self.tx.clone();
        let message = (self.wrap)(id);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(message);
        });
        self.armed.insert(id, Armed { kind, handle });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.armed.remove(&id) {
            Some(armed) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every armed timer matching `pred`.
    pub fn cancel_where(&mut self, pred: impl Fn(&TimerKind) -> bool) {
        self.armed.retain(|_, armed| {
            if pred(&armed.kind) {
                armed.handle.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn is_armed(&self, pred: impl Fn(&TimerKind) -> bool) -> bool {
        self.armed.values().any(|a| pred(&a.kind))
    }

    /// Claim a firing. `None` means the timer was cancelled meanwhile.
    pub fn fire(&mut self, id: TimerId) -> Option<TimerKind> {
        self.armed.remove(&id).map(|armed| armed.kind)
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.handle.abort();
        }
    }
}

impl<C> Drop for Timers<C> {
    fn drop(&mut self) {
        for armed in self.armed.values() {
            armed.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timers() -> (Timers<TimerId>, mpsc::UnboundedReceiver<TimerId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Timers::new(tx, |id| id), rx)
    }

    #[tokio::test]
    async fn fires_once_with_its_kind() {
        let (mut t, mut rx) = timers();
        let id = t.arm(TimerKind::SummaryCheck, Duration::from_millis(5));
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, id);
        assert_eq!(t.fire(fired), Some(TimerKind::SummaryCheck));
        assert_eq!(t.fire(fired), None);
    }

    #[tokio::test]
    async fn cancelled_timer_is_stale_even_if_already_queued() {
        let (mut t, mut rx) = timers();
        let id = t.arm(
            TimerKind::ConnectTimeout { link_id: 1 },
            Duration::from_millis(1),
        );
        let fired = rx.recv().await.unwrap();
        assert!(t.cancel(id));
        assert_eq!(t.fire(fired), None);
    }

    #[tokio::test]
    async fn cancel_where_only_hits_matching_kinds() {
        let (mut t, _rx) = timers();
        t.arm(
            TimerKind::BroadcastWait {
                response_id: "r1".into(),
            },
            Duration::from_secs(60),
        );
        t.arm(TimerKind::PresenceSweep, Duration::from_secs(60));
        t.cancel_where(|k| matches!(k, TimerKind::BroadcastWait { .. }));
        assert!(!t.is_armed(|k| matches!(k, TimerKind::BroadcastWait { .. })));
        assert!(t.is_armed(|k| *k == TimerKind::PresenceSweep));
        t.cancel_all();
        assert!(!t.is_armed(|_| true));
    }
}
