//! Room membership: who is in the room, their roles, presence and the
//! outbound queue used to reach them.

use tokio::sync::mpsc;
use tracing::{debug, info};

use parley_common::{new_id, RoomError};

use crate::protocol::ServerMessage;
use crate::types::{
    Peer, PeerRole, Presence, PresencePatch, RoomConfig, RoomInfo, RoomStatus, TranscriptSettings,
};

/// Outbound queue to one connected peer.
pub type PeerTx = mpsc::UnboundedSender<ServerMessage>;

struct Member {
    peer: Peer,
    tx: PeerTx,
}

pub struct PeerDirectory {
    room_id: String,
    name: String,
    personality: String,
    topic: Option<String>,
    custom_instructions: Option<String>,
    transcript: TranscriptSettings,
    max_participants: u32,
    closed: bool,
    /// Join order.
    members: Vec<Member>,
}

impl PeerDirectory {
    pub fn new(room_id: &str, config: &RoomConfig, default_personality: &str, max: u32) -> Self {
        let name = if config.name.is_empty() {
            room_id.to_string()
        } else {
            config.name.clone()
        };
        Self {
            room_id: room_id.to_string(),
            name,
            personality: config
                .personality
                .clone()
                .unwrap_or_else(|| default_personality.to_string()),
            topic: config.topic.clone(),
            custom_instructions: config.custom_instructions.clone(),
            transcript: config.transcript.clone(),
            max_participants: config.max_participants.unwrap_or(max).max(1),
            closed: config.closed,
            members: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn personality(&self) -> &str {
        &self.personality
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn custom_instructions(&self) -> Option<&str> {
        self.custom_instructions.as_deref()
    }

    pub fn transcript_settings(&self) -> &TranscriptSettings {
        &self.transcript
    }

    pub fn participant_count(&self) -> u32 {
        self.members.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn status(&self) -> RoomStatus {
        if self.closed {
            RoomStatus::Closed
        } else if self.members.is_empty() {
            RoomStatus::Waiting
        } else if self.participant_count() >= self.max_participants {
            RoomStatus::Full
        } else {
            RoomStatus::Active
        }
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.room_id.clone(),
            name: self.name.clone(),
            status: self.status(),
            participant_count: self.participant_count(),
            max_participants: self.max_participants,
            personality: self.personality.clone(),
            topic: self.topic.clone(),
            custom_instructions: self.custom_instructions.clone(),
            transcript: self.transcript.clone(),
        }
    }

    pub fn get(&self, peer_id: &str) -> Option<&Peer> {
        self.members
            .iter()
            .find(|m| m.peer.id == peer_id)
            .map(|m| &m.peer)
    }

    fn get_mut(&mut self, peer_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.peer.id == peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.get(peer_id).is_some()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.members.iter().map(|m| &m.peer)
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.peer.id.clone()).collect()
    }

    /// Display names of everyone except `peer_id`.
    pub fn other_names(&self, peer_id: &str) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| m.peer.id != peer_id)
            .map(|m| m.peer.display_name.clone())
            .collect()
    }

    // -- Membership ---------------------------------------------------------

    /// Admit a peer. The first member becomes owner.
    ///
    /// A requested id is honoured when no current member holds it, so a
    /// reconnecting client keeps its identity. Full or closed rooms reject
    /// without any change.
    pub fn join(
        &mut self,
        display_name: &str,
        avatar: Option<String>,
        requested_id: Option<String>,
        tx: PeerTx,
        now_ms: i64,
    ) -> Result<Peer, RoomError> {
        if self.closed {
            return Err(RoomError::RoomClosed);
        }
        if self.participant_count() >= self.max_participants {
            return Err(RoomError::RoomFull);
        }

        let id = match requested_id {
            Some(id) if !id.is_empty() && !self.contains(&id) => id,
            _ => new_id(),
        };
        let role = if self.members.is_empty() {
            PeerRole::Owner
        } else {
            PeerRole::Participant
        };
        let peer = Peer {
            id,
            display_name: display_name.to_string(),
            avatar,
            role,
            presence: Presence::new(now_ms),
            joined_at: now_ms,
        };
        self.members.push(Member {
            peer: peer.clone(),
            tx,
        });
        info!(room_id = %self.room_id, peer = %peer.id, name = %peer.display_name, "Peer joined room");
        Ok(peer)
    }

    pub fn leave(&mut self, peer_id: &str) -> Option<Peer> {
        let idx = self.members.iter().position(|m| m.peer.id == peer_id)?;
        let member = self.members.remove(idx);
        info!(room_id = %self.room_id, peer = %peer_id, "Peer left room");
        Some(member.peer)
    }

    /// Remove everyone and refuse further joins. Dropping the queues ends
    /// each peer's connection once pending messages drain.
    pub fn close(&mut self) -> Vec<Peer> {
        self.closed = true;
        self.members.drain(..).map(|m| m.peer).collect()
    }

    pub fn rename(&mut self, peer_id: &str, display_name: &str) -> bool {
        match self.get_mut(peer_id) {
            Some(m) => {
                m.peer.display_name = display_name.to_string();
                true
            }
            None => false,
        }
    }

    // -- Presence -----------------------------------------------------------

    pub fn update_presence(
        &mut self,
        peer_id: &str,
        patch: &PresencePatch,
        now_ms: i64,
    ) -> Option<Presence> {
        let m = self.get_mut(peer_id)?;
        m.peer.presence.apply(patch, now_ms);
        Some(m.peer.presence.clone())
    }

    /// Refresh activity. Returns the presence when the peer was idle and
    /// has now become active again.
    pub fn heartbeat(&mut self, peer_id: &str, now_ms: i64) -> Option<Presence> {
        let m = self.get_mut(peer_id)?;
        let was_idle = m.peer.presence.idle;
        m.peer.presence.last_active_at = now_ms;
        m.peer.presence.idle = false;
        was_idle.then(|| m.peer.presence.clone())
    }

    /// Mark peers idle whose last activity is older than `idle_after_ms`.
    pub fn sweep_idle(&mut self, now_ms: i64, idle_after_ms: i64) -> Vec<(String, Presence)> {
        let mut changed = Vec::new();
        for m in &mut self.members {
            let p = &mut m.peer.presence;
            if !p.idle && now_ms - p.last_active_at >= idle_after_ms {
                p.idle = true;
                changed.push((m.peer.id.clone(), p.clone()));
            }
        }
        changed
    }

    // -- Delivery -----------------------------------------------------------

    pub fn send_to(&self, peer_id: &str, message: ServerMessage) -> bool {
        match self.members.iter().find(|m| m.peer.id == peer_id) {
            Some(m) => m.tx.send(message).is_ok(),
            None => {
                debug!(room_id = %self.room_id, peer = %peer_id, "Dropping message for absent peer");
                false
            }
        }
    }

    pub fn broadcast(&self, message: &ServerMessage) {
        for m in &self.members {
            let _ = m.tx.send(message.clone());
        }
    }

    pub fn broadcast_except(&self, except: &str, message: &ServerMessage) {
        for m in self.members.iter().filter(|m| m.peer.id != except) {
            let _ = m.tx.send(message.clone());
        }
    }
}
