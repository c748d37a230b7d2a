//! Reconnection with backoff for the signaling socket, WebRTC peer links
//! and the upstream AI session.
//!
//! [`ReconnectionManager`] owns the retry loop and an optional
//! [`RoomStateSnapshot`] that is handed to a restore hook once the primary
//! connection comes back. [`PeerReconnections`] keeps one manager per
//! remote WebRTC peer.

mod backoff;
mod manager;
mod peers;

pub use backoff::{
    calculate_reconnection_delay, is_recoverable_error, should_reconnect, ReconnectPolicy,
    NON_RECOVERABLE_KEYWORDS,
};
pub use manager::{
    ConnectionKind, ReconnectAttempt, ReconnectError, ReconnectState, ReconnectionManager,
    ReconnectionStatus, RestoreHook, RoomStateSnapshot, StatusHook,
};
pub use peers::PeerReconnections;

#[cfg(test)]
mod tests;
