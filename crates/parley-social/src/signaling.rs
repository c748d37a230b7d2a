//! WebRTC signaling relay: offers, answers and ICE candidates are forwarded
//! verbatim to a target peer in the same room.

use tracing::debug;

use crate::peers::PeerDirectory;
use crate::protocol::ServerMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer { sdp: String },
    Answer { sdp: String },
    Ice { candidate: serde_json::Value },
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer { .. } => "offer",
            Signal::Answer { .. } => "answer",
            Signal::Ice { .. } => "ice",
        }
    }

    fn into_message(self, from_peer_id: String) -> ServerMessage {
        match self {
            Signal::Offer { sdp } => ServerMessage::Offer { from_peer_id, sdp },
            Signal::Answer { sdp } => ServerMessage::Answer { from_peer_id, sdp },
            Signal::Ice { candidate } => ServerMessage::Ice {
                from_peer_id,
                candidate,
            },
        }
    }
}

/// Forward `signal` from `from` to `target`. A missing target (already left)
/// or a sender outside the room is a silent no-op. Returns whether the
/// signal was delivered.
pub fn relay(directory: &PeerDirectory, from: &str, target: &str, signal: Signal) -> bool {
    if !directory.contains(from) {
        debug!(room_id = %directory.room_id(), from, "Signal from non-member ignored");
        return false;
    }
    if from == target {
        return false;
    }
    if !directory.contains(target) {
        debug!(room_id = %directory.room_id(), from, target, kind = signal.kind(), "Signal target absent");
        return false;
    }
    directory.send_to(target, signal.into_message(from.to_string()))
}
