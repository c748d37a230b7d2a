use std::future::Future;
use std::sync::Arc;

use parley_common::now_ms;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::backoff::{calculate_reconnection_delay, is_recoverable_error, ReconnectPolicy};
use crate::types::Peer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    Signaling,
    WebrtcPeer,
    AiSession,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signaling => "signaling",
            Self::WebrtcPeer => "webrtc-peer",
            Self::AiSession => "ai-session",
        }
    }

    /// The connection whose recovery restores the saved room snapshot.
    pub fn is_primary(self) -> bool {
        self == Self::Signaling
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectState {
    #[default]
    Idle,
    Waiting,
    Reconnecting,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectAttempt {
    pub attempt: u32,
    pub delay_ms: u64,
    pub error: Option<String>,
    pub at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectionStatus {
    pub kind: ConnectionKind,
    pub state: ReconnectState,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub history: Vec<ReconnectAttempt>,
}

impl ReconnectionStatus {
    fn new(kind: ConnectionKind, max_attempts: u32) -> Self {
        Self {
            kind,
            state: ReconnectState::Idle,
            attempt: 0,
            max_attempts,
            last_error: None,
            history: Vec::new(),
        }
    }
}

/// What a client needs to put itself back into a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateSnapshot {
    pub room_id: String,
    pub local_peer_id: String,
    pub display_name: String,
    pub peers: Vec<Peer>,
    pub ai_session_active: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    #[error("not recoverable: {0}")]
    NonRecoverable(String),

    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("reconnection cancelled")]
    Cancelled,
}

pub type StatusHook = Arc<dyn Fn(&ReconnectionStatus) + Send + Sync>;
pub type RestoreHook = Arc<dyn Fn(&RoomStateSnapshot) + Send + Sync>;

pub struct ReconnectionManager {
    kind: ConnectionKind,
    policy: ReconnectPolicy,
    status: ReconnectionStatus,
    snapshot: Option<RoomStateSnapshot>,
    on_status: Option<StatusHook>,
    on_restore: Option<RestoreHook>,
}

impl ReconnectionManager {
    pub fn new(kind: ConnectionKind, policy: ReconnectPolicy) -> Self {
        let status = ReconnectionStatus::new(kind, policy.max_attempts);
        Self {
            kind,
            policy,
            status,
            snapshot: None,
            on_status: None,
            on_restore: None,
        }
    }

    /// Called on every state change of the retry loop.
    pub fn on_status(mut self, hook: StatusHook) -> Self {
        self.on_status = Some(hook);
        self
    }

    /// Called with the saved snapshot after the primary connection recovers.
    pub fn on_restore(mut self, hook: RestoreHook) -> Self {
        self.on_restore = Some(hook);
        self
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn status(&self) -> &ReconnectionStatus {
        &self.status
    }

    pub fn save_room_state(&mut self, snapshot: RoomStateSnapshot) {
        self.snapshot = Some(snapshot);
    }

    pub fn get_saved_room_state(&self) -> Option<&RoomStateSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn clear_room_state(&mut self) {
        self.snapshot = None;
    }

    /// Back to `idle`, keeping any saved snapshot.
    pub fn reset(&mut self) {
        self.status = ReconnectionStatus::new(self.kind, self.policy.max_attempts);
        self.notify();
    }

    /// Retry `connect` with backoff until it succeeds, the attempts run out,
    /// an error is classified non-recoverable, or `cancel` fires.
    ///
    /// `cause` is the error that dropped the connection; a non-recoverable
    /// cause fails immediately without a single attempt. On success the
    /// connection value and the attempt number are returned.
    pub async fn start_reconnection<T, F, Fut>(
        &mut self,
        mut connect: F,
        cause: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(T, u32), ReconnectError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        self.status = ReconnectionStatus::new(self.kind, self.policy.max_attempts);
        self.status.last_error = cause.clone();

        if let Some(cause) = cause.filter(|c| !is_recoverable_error(c)) {
            warn!(kind = self.kind.as_str(), error = %cause, "Not reconnecting");
            return Err(self.fail(ReconnectError::NonRecoverable(cause)));
        }

        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            let delay = calculate_reconnection_delay(attempt, &self.policy);
            self.status.state = ReconnectState::Waiting;
            self.status.attempt = attempt;
            self.notify();
            info!(
                kind = self.kind.as_str(),
                attempt,
                max,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after delay"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(self.fail(ReconnectError::Cancelled)),
                _ = tokio::time::sleep(delay) => {}
            }

            self.status.state = ReconnectState::Reconnecting;
            self.notify();
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(self.fail(ReconnectError::Cancelled)),
                r = connect(attempt) => r,
            };

            match result {
                Ok(value) => {
                    self.record(attempt, delay.as_millis() as u64, None);
                    self.status.state = ReconnectState::Success;
                    self.status.last_error = None;
                    self.notify();
                    info!(kind = self.kind.as_str(), attempt, "Reconnected");
                    if self.kind.is_primary() {
                        if let (Some(snapshot), Some(hook)) = (&self.snapshot, &self.on_restore) {
                            hook(snapshot);
                        }
                    }
                    return Ok((value, attempt));
                }
                Err(error) => {
                    warn!(kind = self.kind.as_str(), attempt, error = %error, "Reconnect attempt failed");
                    self.record(attempt, delay.as_millis() as u64, Some(error.clone()));
                    self.status.last_error = Some(error.clone());
                    if !is_recoverable_error(&error) {
                        return Err(self.fail(ReconnectError::NonRecoverable(error)));
                    }
                }
            }
        }

        Err(self.fail(ReconnectError::Exhausted { attempts: max }))
    }

    fn record(&mut self, attempt: u32, delay_ms: u64, error: Option<String>) {
        self.status.history.push(ReconnectAttempt {
            attempt,
            delay_ms,
            error,
            at: now_ms(),
        });
    }

    fn fail(&mut self, error: ReconnectError) -> ReconnectError {
        self.status.state = ReconnectState::Failed;
        if self.status.last_error.is_none() {
            self.status.last_error = Some(error.to_string());
        }
        self.notify();
        error
    }

    fn notify(&self) {
        if let Some(hook) = &self.on_status {
            hook(&self.status);
        }
    }
}
