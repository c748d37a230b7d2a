use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use parley_common::new_id;
use tracing::{debug, info};

use crate::protocol::ServerMessage;

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastSettings {
    /// Buffered audio needed before playback may start.
    pub buffer_threshold_ms: u64,
    /// Upper bound on the buffering phase.
    pub max_buffer_wait: Duration,
    /// Lead time added to "now" for the synchronized start.
    pub sync_offset_ms: u64,
    pub max_buffer_chunks: usize,
    /// Share of peers that must report ready before the threshold start.
    pub min_ready_fraction: f64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            buffer_threshold_ms: 200,
            max_buffer_wait: Duration::from_millis(500),
            sync_offset_ms: 150,
            max_buffer_chunks: 1024,
            min_ready_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Idle,
    Buffering,
    Broadcasting,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastAudioChunk {
    pub id: String,
    pub sequence: u64,
    pub audio: String,
    pub duration_ms: u64,
    pub is_first: bool,
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    pub id: String,
    pub trigger_peer_id: Option<String>,
    pub state: ResponseState,
    pub started_at: i64,
    pub broadcast_started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub chunks_received: u64,
    pub synced_start_time: Option<i64>,
}

impl ResponseInfo {
    fn is_live(&self) -> bool {
        matches!(self.state, ResponseState::Buffering | ResponseState::Broadcasting)
    }
}

/// Per-peer delivery state. `last_chunk_sent` only ever moves forward
/// within a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSubscription {
    pub peer_id: String,
    pub last_chunk_sent: Option<u64>,
    pub ready: bool,
    pub buffered_ms: u64,
}

impl PeerSubscription {
    fn new(peer_id: &str) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            last_chunk_sent: None,
            ready: false,
            buffered_ms: 0,
        }
    }

    fn reset(&mut self) {
        self.last_chunk_sent = None;
        self.ready = false;
        self.buffered_ms = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastAction {
    Send {
        peer_id: String,
        message: ServerMessage,
    },
    ArmWaitTimer {
        response_id: String,
        after: Duration,
    },
    DisarmWaitTimer,
}

pub struct ResponseBroadcastManager {
    settings: BroadcastSettings,
    peers: BTreeMap<String, PeerSubscription>,
    buffer: VecDeque<BroadcastAudioChunk>,
    buffered_duration_ms: u64,
    current: Option<ResponseInfo>,
    next_sequence: u64,
}

impl ResponseBroadcastManager {
    pub fn new(settings: BroadcastSettings) -> Self {
        Self {
            settings,
            peers: BTreeMap::new(),
            buffer: VecDeque::new(),
            buffered_duration_ms: 0,
            current: None,
            next_sequence: 0,
        }
    }

    pub fn current(&self) -> Option<&ResponseInfo> {
        self.current.as_ref()
    }

    pub fn state(&self) -> ResponseState {
        self.current
            .as_ref()
            .map_or(ResponseState::Idle, |r| r.state)
    }

    pub fn peer(&self, peer_id: &str) -> Option<&PeerSubscription> {
        self.peers.get(peer_id)
    }

    pub fn buffered_duration_ms(&self) -> u64 {
        self.buffered_duration_ms
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    // -- Subscriptions ------------------------------------------------------

    /// Subscribe a peer. Mid-broadcast joiners are replayed the whole
    /// current buffer before any further live chunk.
    pub fn add_peer(&mut self, peer_id: &str) -> Vec<BroadcastAction> {
        self.peers
            .entry(peer_id.to_string())
            .or_insert_with(|| PeerSubscription::new(peer_id));

        let mut actions = Vec::new();
        let Some(current) = &self.current else {
            return actions;
        };
        if current.state != ResponseState::Broadcasting {
            return actions;
        }
        actions.push(BroadcastAction::Send {
            peer_id: peer_id.to_string(),
            message: ServerMessage::AudioStart {
                response_id: current.id.clone(),
                synced_start_time: current.synced_start_time.unwrap_or_default(),
                catch_up: true,
            },
        });
        let response_id = current.id.clone();
        let replay: Vec<BroadcastAudioChunk> = self.buffer.iter().cloned().collect();
        debug!(peer = %peer_id, chunks = replay.len(), "Late joiner catch-up");
        for chunk in &replay {
            actions.extend(self.deliver(peer_id, &response_id, chunk));
        }
        actions
    }

    pub fn remove_peer(&mut self, peer_id: &str, now_ms: i64) -> Vec<BroadcastAction> {
        self.peers.remove(peer_id);
        // The departed peer may have been the one holding up the start.
        self.maybe_begin(now_ms)
    }

    /// Record a client's playback readiness report.
    pub fn set_ready(
        &mut self,
        peer_id: &str,
        ready: bool,
        buffered_ms: u64,
        now_ms: i64,
    ) -> Vec<BroadcastAction> {
        match self.peers.get_mut(peer_id) {
            Some(sub) => {
                sub.ready = ready;
                sub.buffered_ms = buffered_ms;
            }
            None => return Vec::new(),
        }
        self.maybe_begin(now_ms)
    }

    // -- Response lifecycle -------------------------------------------------

    pub fn start_response(
        &mut self,
        response_id: &str,
        trigger_peer_id: Option<String>,
        now_ms: i64,
    ) -> Vec<BroadcastAction> {
        let mut actions = self.cancel_response(now_ms);

        self.buffer.clear();
        self.buffered_duration_ms = 0;
        self.next_sequence = 0;
        for sub in self.peers.values_mut() {
            sub.reset();
        }
        self.current = Some(ResponseInfo {
            id: response_id.to_string(),
            trigger_peer_id,
            state: ResponseState::Buffering,
            started_at: now_ms,
            broadcast_started_at: None,
            ended_at: None,
            chunks_received: 0,
            synced_start_time: None,
        });
        debug!(response = %response_id, "Response buffering");
        actions.push(BroadcastAction::ArmWaitTimer {
            response_id: response_id.to_string(),
            after: self.settings.max_buffer_wait,
        });
        actions
    }

    pub fn add_chunk(
        &mut self,
        response_id: &str,
        audio: String,
        duration_ms: u64,
        is_last: bool,
        now_ms: i64,
    ) -> Vec<BroadcastAction> {
        let state = match &mut self.current {
            Some(current) if current.id == response_id && current.is_live() => {
                current.chunks_received += 1;
                current.state
            }
            _ => {
                debug!(response = %response_id, "Chunk for inactive response dropped");
                return Vec::new();
            }
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let chunk = BroadcastAudioChunk {
            id: new_id(),
            sequence,
            audio,
            duration_ms,
            is_first: sequence == 0,
            is_last,
        };
        self.buffer.push_back(chunk.clone());
        self.buffered_duration_ms += duration_ms;
        while self.buffer.len() > self.settings.max_buffer_chunks.max(1) {
            if let Some(old) = self.buffer.pop_front() {
                self.buffered_duration_ms = self.buffered_duration_ms.saturating_sub(old.duration_ms);
            }
        }

        match state {
            ResponseState::Broadcasting => {
                let ids: Vec<String> = self.peers.keys().cloned().collect();
                ids.iter()
                    .filter_map(|id| self.deliver(id, response_id, &chunk))
                    .collect()
            }
            _ => self.maybe_begin(now_ms),
        }
    }

    /// The buffering deadline passed: start regardless of readiness.
    pub fn on_wait_timeout(&mut self, response_id: &str, now_ms: i64) -> Vec<BroadcastAction> {
        match &self.current {
            Some(c) if c.id == response_id && c.state == ResponseState::Buffering => {
                debug!(response = %response_id, "Buffer wait elapsed; forcing broadcast");
                self.begin_broadcast(now_ms)
            }
            _ => Vec::new(),
        }
    }

    pub fn end_response(&mut self, response_id: &str, now_ms: i64) -> Vec<BroadcastAction> {
        let mut actions = Vec::new();
        let state = match &self.current {
            Some(c) if c.id == response_id && c.is_live() => c.state,
            _ => return actions,
        };
        if state == ResponseState::Buffering {
            // Short responses may finish before the threshold.
            actions.extend(self.begin_broadcast(now_ms));
        }
        if let Some(current) = &mut self.current {
            current.state = ResponseState::Completed;
            current.ended_at = Some(now_ms);
            info!(
                response = %response_id,
                chunks = current.chunks_received,
                "Response broadcast complete"
            );
        }
        self.buffer.clear();
        self.buffered_duration_ms = 0;
        actions.push(BroadcastAction::DisarmWaitTimer);
        actions.extend(self.to_all(ServerMessage::ResponseEnd {
            response_id: response_id.to_string(),
        }));
        actions
    }

    /// Abort the live response, if any, and discard its buffer.
    pub fn cancel_response(&mut self, now_ms: i64) -> Vec<BroadcastAction> {
        let response_id = match &mut self.current {
            Some(c) if c.is_live() => {
                c.state = ResponseState::Cancelled;
                c.ended_at = Some(now_ms);
                c.id.clone()
            }
            _ => return Vec::new(),
        };
        self.buffer.clear();
        self.buffered_duration_ms = 0;
        info!(response = %response_id, "Response broadcast cancelled");
        let mut actions = vec![BroadcastAction::DisarmWaitTimer];
        actions.extend(self.to_all(ServerMessage::ResponseCancelled { response_id }));
        actions
    }

    /// Forget everything, including subscriptions.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.buffer.clear();
        self.buffered_duration_ms = 0;
        self.current = None;
        self.next_sequence = 0;
    }

    // -- Internals ----------------------------------------------------------

    fn ready_to_broadcast(&self) -> bool {
        if self.buffered_duration_ms < self.settings.buffer_threshold_ms {
            return false;
        }
        if self.peers.is_empty() {
            return true;
        }
        let needed = (self.settings.min_ready_fraction * self.peers.len() as f64).ceil() as usize;
        self.peers.values().filter(|p| p.ready).count() >= needed
    }

    fn maybe_begin(&mut self, now_ms: i64) -> Vec<BroadcastAction> {
        let buffering = self
            .current
            .as_ref()
            .is_some_and(|c| c.state == ResponseState::Buffering);
        if buffering && self.ready_to_broadcast() {
            self.begin_broadcast(now_ms)
        } else {
            Vec::new()
        }
    }

    fn begin_broadcast(&mut self, now_ms: i64) -> Vec<BroadcastAction> {
        let (response_id, synced) = match &mut self.current {
            Some(c) => {
                let synced = now_ms + self.settings.sync_offset_ms as i64;
                c.state = ResponseState::Broadcasting;
                c.broadcast_started_at = Some(now_ms);
                c.synced_start_time = Some(synced);
                (c.id.clone(), synced)
            }
            None => return Vec::new(),
        };
        info!(
            response = %response_id,
            peers = self.peers.len(),
            buffered_ms = self.buffered_duration_ms,
            "Response broadcasting"
        );

        let mut actions = vec![BroadcastAction::DisarmWaitTimer];
        actions.extend(self.to_all(ServerMessage::AudioStart {
            response_id: response_id.clone(),
            synced_start_time: synced,
            catch_up: false,
        }));
        let chunks: Vec<BroadcastAudioChunk> = self.buffer.iter().cloned().collect();
        let ids: Vec<String> = self.peers.keys().cloned().collect();
        for id in &ids {
            for chunk in &chunks {
                actions.extend(self.deliver(id, &response_id, chunk));
            }
        }
        actions
    }

    /// Send `chunk` to `peer_id` unless that peer already has it.
    fn deliver(
        &mut self,
        peer_id: &str,
        response_id: &str,
        chunk: &BroadcastAudioChunk,
    ) -> Option<BroadcastAction> {
        let sub = self.peers.get_mut(peer_id)?;
        if sub.last_chunk_sent.is_some_and(|last| chunk.sequence <= last) {
            return None;
        }
        sub.last_chunk_sent = Some(chunk.sequence);
        Some(BroadcastAction::Send {
            peer_id: peer_id.to_string(),
            message: ServerMessage::AudioChunk {
                response_id: response_id.to_string(),
                sequence: chunk.sequence,
                audio: chunk.audio.clone(),
                duration_ms: chunk.duration_ms,
                is_first: chunk.is_first,
                is_last: chunk.is_last,
            },
        })
    }

    fn to_all(&self, message: ServerMessage) -> Vec<BroadcastAction> {
        self.peers
            .keys()
            .map(|id| BroadcastAction::Send {
                peer_id: id.clone(),
                message: message.clone(),
            })
            .collect()
    }
}
