//! Folding server events into the client's view of the room.

use parley_common::now_ms;

use crate::protocol::ServerMessage;
use crate::reconnect::RoomStateSnapshot;
use crate::types::AiState;

/// Update `snapshot` from one server event. Returns true if anything changed.
pub fn apply(snapshot: &mut RoomStateSnapshot, message: &ServerMessage) -> bool {
    match message {
        ServerMessage::Joined {
            room,
            local_peer,
            peers,
            ai_state,
        } => {
            snapshot.room_id = room.id.clone();
            snapshot.local_peer_id = local_peer.id.clone();
            snapshot.display_name = local_peer.display_name.clone();
            snapshot.peers = peers.clone();
            snapshot.ai_session_active = ai_state.state != AiState::Idle;
        }
        ServerMessage::PeerJoined { peer } => {
            if peer.id == snapshot.local_peer_id {
                return false;
            }
            match snapshot.peers.iter_mut().find(|p| p.id == peer.id) {
                Some(existing) => *existing = peer.clone(),
                None => snapshot.peers.push(peer.clone()),
            }
        }
        ServerMessage::PeerLeft { peer_id, .. } => {
            let before = snapshot.peers.len();
            snapshot.peers.retain(|p| &p.id != peer_id);
            if snapshot.peers.len() == before {
                return false;
            }
        }
        ServerMessage::NameUpdated {
            peer_id,
            display_name,
        } => {
            if *peer_id == snapshot.local_peer_id {
                snapshot.display_name = display_name.clone();
            } else if let Some(peer) = snapshot.peers.iter_mut().find(|p| &p.id == peer_id) {
                peer.display_name = display_name.clone();
            } else {
                return false;
            }
        }
        ServerMessage::PresenceUpdated { peer_id, presence } => {
            let Some(peer) = snapshot.peers.iter_mut().find(|p| &p.id == peer_id) else {
                return false;
            };
            peer.presence = presence.clone();
        }
        ServerMessage::AiState(view) => {
            snapshot.ai_session_active = view.state != AiState::Idle;
        }
        ServerMessage::RoomClosed { .. } => {
            snapshot.peers.clear();
            snapshot.ai_session_active = false;
        }
        _ => return false,
    }
    snapshot.timestamp = now_ms();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::PeerDirectory;
    use crate::types::{AiStateView, RoomConfig};
    use tokio::sync::mpsc;

    fn directory_with(names: &[&str]) -> (PeerDirectory, Vec<crate::types::Peer>) {
        let mut dir = PeerDirectory::new("r1", &RoomConfig::default(), "facilitator", 8);
        let peers = names
            .iter()
            .map(|name| {
                let (tx, _rx) = mpsc::unbounded_channel();
                dir.join(name, None, None, tx, 1_000).unwrap()
            })
            .collect();
        (dir, peers)
    }

    fn empty() -> RoomStateSnapshot {
        RoomStateSnapshot {
            room_id: String::new(),
            local_peer_id: String::new(),
            display_name: String::new(),
            peers: Vec::new(),
            ai_session_active: false,
            timestamp: 0,
        }
    }

    #[test]
    fn joined_replaces_the_whole_view() {
        let (dir, peers) = directory_with(&["Ada", "Bo"]);
        let mut snap = empty();
        let changed = apply(
            &mut snap,
            &ServerMessage::Joined {
                room: dir.info(),
                local_peer: peers[1].clone(),
                peers: vec![peers[0].clone()],
                ai_state: AiStateView {
                    state: AiState::Speaking,
                    ..Default::default()
                },
            },
        );
        assert!(changed);
        assert_eq!(snap.room_id, "r1");
        assert_eq!(snap.local_peer_id, peers[1].id);
        assert_eq!(snap.display_name, "Bo");
        assert_eq!(snap.peers.len(), 1);
        assert!(snap.ai_session_active);
        assert!(snap.timestamp > 0);
    }

    #[test]
    fn membership_changes_track_peers() {
        let (_, peers) = directory_with(&["Ada", "Bo", "Cy"]);
        let mut snap = empty();
        snap.local_peer_id = peers[0].id.clone();

        apply(&mut snap, &ServerMessage::PeerJoined { peer: peers[1].clone() });
        apply(&mut snap, &ServerMessage::PeerJoined { peer: peers[2].clone() });
        apply(&mut snap, &ServerMessage::PeerJoined { peer: peers[2].clone() });
        assert_eq!(snap.peers.len(), 2);

        // Our own announcement is not a remote peer.
        assert!(!apply(&mut snap, &ServerMessage::PeerJoined { peer: peers[0].clone() }));

        apply(
            &mut snap,
            &ServerMessage::PeerLeft {
                peer_id: peers[1].id.clone(),
                reason: "left".into(),
            },
        );
        assert_eq!(snap.peers.len(), 1);
        assert_eq!(snap.peers[0].id, peers[2].id);
    }

    #[test]
    fn renames_apply_to_self_and_others() {
        let (_, peers) = directory_with(&["Ada", "Bo"]);
        let mut snap = empty();
        snap.local_peer_id = peers[0].id.clone();
        snap.peers = vec![peers[1].clone()];

        apply(
            &mut snap,
            &ServerMessage::NameUpdated {
                peer_id: peers[0].id.clone(),
                display_name: "Ada L.".into(),
            },
        );
        apply(
            &mut snap,
            &ServerMessage::NameUpdated {
                peer_id: peers[1].id.clone(),
                display_name: "Bo K.".into(),
            },
        );
        assert_eq!(snap.display_name, "Ada L.");
        assert_eq!(snap.peers[0].display_name, "Bo K.");
    }

    #[test]
    fn unrelated_events_leave_snapshot_untouched() {
        let mut snap = empty();
        assert!(!apply(&mut snap, &ServerMessage::TurnGranted));
        assert_eq!(snap.timestamp, 0);
    }
}
