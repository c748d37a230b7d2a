//! Wire protocol between room clients and the relay.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}`.
//! Payload fields are camelCase. Events without a payload omit `data`.

use parley_ai::context::{ContextSummary, ConversationMessage, TranscriptPage};
use parley_ai::StructuredSummary;
use parley_common::RoomError;
use serde::{Deserialize, Serialize};

use crate::types::{AiStateView, Peer, PresencePatch, Presence, RoomInfo};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "room:join")]
    Join(JoinRequest),

    #[serde(rename = "room:leave")]
    Leave,

    #[serde(rename = "signal:offer", rename_all = "camelCase")]
    Offer { target_peer_id: String, sdp: String },

    #[serde(rename = "signal:answer", rename_all = "camelCase")]
    Answer { target_peer_id: String, sdp: String },

    #[serde(rename = "signal:ice", rename_all = "camelCase")]
    Ice {
        target_peer_id: String,
        candidate: serde_json::Value,
    },

    #[serde(rename = "presence:update")]
    PresenceUpdate(PresencePatch),

    #[serde(rename = "presence:heartbeat")]
    Heartbeat,

    #[serde(rename = "peer:update_name", rename_all = "camelCase")]
    UpdateName { display_name: String },

    #[serde(rename = "ai:request_turn")]
    RequestTurn,

    #[serde(rename = "ai:ptt_start")]
    PttStart,

    #[serde(rename = "ai:ptt_end")]
    PttEnd,

    #[serde(rename = "ai:cancel_turn")]
    CancelTurn,

    #[serde(rename = "ai:interrupt")]
    Interrupt,

    #[serde(rename = "ai:voice_interrupt")]
    VoiceInterrupt {
        #[serde(default)]
        reason: Option<String>,
    },

    #[serde(rename = "ai:audio_data")]
    AudioData { audio: String },

    #[serde(rename = "ai:buffer_status", rename_all = "camelCase")]
    BufferStatus {
        ready: bool,
        #[serde(default)]
        buffered_ms: u64,
    },

    #[serde(rename = "transcript:request-history")]
    RequestHistory {
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        before: Option<String>,
    },

    #[serde(rename = "transcript:ambient")]
    Ambient { text: String },

    #[serde(rename = "transcript:generate-summary")]
    GenerateSummary,
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Join(_) => "room:join",
            Self::Leave => "room:leave",
            Self::Offer { .. } => "signal:offer",
            Self::Answer { .. } => "signal:answer",
            Self::Ice { .. } => "signal:ice",
            Self::PresenceUpdate(_) => "presence:update",
            Self::Heartbeat => "presence:heartbeat",
            Self::UpdateName { .. } => "peer:update_name",
            Self::RequestTurn => "ai:request_turn",
            Self::PttStart => "ai:ptt_start",
            Self::PttEnd => "ai:ptt_end",
            Self::CancelTurn => "ai:cancel_turn",
            Self::Interrupt => "ai:interrupt",
            Self::VoiceInterrupt { .. } => "ai:voice_interrupt",
            Self::AudioData { .. } => "ai:audio_data",
            Self::BufferStatus { .. } => "ai:buffer_status",
            Self::RequestHistory { .. } => "transcript:request-history",
            Self::Ambient { .. } => "transcript:ambient",
            Self::GenerateSummary => "transcript:generate-summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Requested peer id, used when rejoining after a dropped connection.
    #[serde(default)]
    pub peer_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "room:joined", rename_all = "camelCase")]
    Joined {
        room: RoomInfo,
        local_peer: Peer,
        peers: Vec<Peer>,
        ai_state: AiStateView,
    },

    #[serde(rename = "room:peer_joined")]
    PeerJoined { peer: Peer },

    #[serde(rename = "room:peer_left", rename_all = "camelCase")]
    PeerLeft { peer_id: String, reason: String },

    #[serde(rename = "room:updated")]
    RoomUpdated { room: RoomInfo },

    #[serde(rename = "room:closed")]
    RoomClosed { reason: String },

    #[serde(rename = "error")]
    Error(ErrorPayload),

    #[serde(rename = "signal:offer", rename_all = "camelCase")]
    Offer { from_peer_id: String, sdp: String },

    #[serde(rename = "signal:answer", rename_all = "camelCase")]
    Answer { from_peer_id: String, sdp: String },

    #[serde(rename = "signal:ice", rename_all = "camelCase")]
    Ice {
        from_peer_id: String,
        candidate: serde_json::Value,
    },

    #[serde(rename = "presence:updated", rename_all = "camelCase")]
    PresenceUpdated { peer_id: String, presence: Presence },

    #[serde(rename = "peer:name_updated", rename_all = "camelCase")]
    NameUpdated {
        peer_id: String,
        display_name: String,
    },

    #[serde(rename = "ai:state")]
    AiState(AiStateView),

    #[serde(rename = "ai:turn_granted")]
    TurnGranted,

    #[serde(rename = "ai:turn_denied")]
    TurnDenied(ErrorPayload),

    #[serde(rename = "ai:interrupted", rename_all = "camelCase")]
    Interrupted {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        by_peer_id: Option<String>,
    },

    #[serde(rename = "ai:audio_start", rename_all = "camelCase")]
    AudioStart {
        response_id: String,
        /// Unix epoch milliseconds at which every client starts playback.
        synced_start_time: i64,
        catch_up: bool,
    },

    #[serde(rename = "ai:audio_chunk", rename_all = "camelCase")]
    AudioChunk {
        response_id: String,
        sequence: u64,
        audio: String,
        duration_ms: u64,
        is_first: bool,
        is_last: bool,
    },

    #[serde(rename = "ai:response_end", rename_all = "camelCase")]
    ResponseEnd { response_id: String },

    #[serde(rename = "ai:response_cancelled", rename_all = "camelCase")]
    ResponseCancelled { response_id: String },

    #[serde(rename = "ai:error")]
    AiError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    #[serde(rename = "ai:reconnecting", rename_all = "camelCase")]
    AiReconnecting { attempt: u32, max_attempts: u32 },

    #[serde(rename = "ai:reconnected")]
    AiReconnected,

    #[serde(rename = "ai:reconnect_failed")]
    AiReconnectFailed { reason: String },

    #[serde(rename = "transcript:entry")]
    TranscriptEntry { entry: ConversationMessage },

    #[serde(rename = "transcript:history")]
    History(TranscriptPage),

    #[serde(rename = "transcript:summary")]
    Summary { summary: StructuredSummary },

    #[serde(rename = "transcript:summarized")]
    Summarized { summary: ContextSummary },
}

impl ServerMessage {
    pub fn error(err: &RoomError) -> Self {
        Self::Error(ErrorPayload::from(err))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_speaker_id: Option<String>,
}

impl From<&RoomError> for ErrorPayload {
    fn from(err: &RoomError) -> Self {
        let active_speaker_id = match err {
            RoomError::PttBlocked { active_speaker_id } => Some(active_speaker_id.clone()),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            active_speaker_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"event":"room:join","data":{"roomId":"r1","displayName":"Ada"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join(JoinRequest {
                room_id: "r1".into(),
                display_name: "Ada".into(),
                avatar: None,
                peer_id: None,
            })
        );
    }

    #[test]
    fn unit_events_need_no_data() {
        let msg: ClientMessage = serde_json::from_str(r#"{"event":"ai:ptt_start"}"#).unwrap();
        assert_eq!(msg, ClientMessage::PttStart);
        let json = serde_json::to_string(&ClientMessage::Heartbeat).unwrap();
        assert_eq!(json, r#"{"event":"presence:heartbeat"}"#);
    }

    #[test]
    fn signal_payload_is_camel_case() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"event":"signal:ice","data":{"targetPeerId":"p2","candidate":{"candidate":"c","sdpMid":"0"}}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Ice {
                target_peer_id,
                candidate,
            } => {
                assert_eq!(target_peer_id, "p2");
                assert_eq!(candidate["sdpMid"], "0");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn history_request_defaults() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"event":"transcript:request-history","data":{}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::RequestHistory {
                limit: None,
                before: None
            }
        );
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"event":"nope"}"#).is_err());
    }

    #[test]
    fn event_names_match_serialized_tags() {
        let samples = vec![
            ClientMessage::Leave,
            ClientMessage::PttEnd,
            ClientMessage::BufferStatus {
                ready: true,
                buffered_ms: 10,
            },
            ClientMessage::Ambient { text: "x".into() },
        ];
        for msg in samples {
            let v = serde_json::to_value(&msg).unwrap();
            assert_eq!(v["event"], msg.event_name());
        }
    }

    #[test]
    fn error_payload_carries_code_and_speaker() {
        let msg = ServerMessage::error(&RoomError::PttBlocked {
            active_speaker_id: "p1".into(),
        });
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["event"], "error");
        assert_eq!(v["data"]["code"], "PTT_BLOCKED");
        assert_eq!(v["data"]["activeSpeakerId"], "p1");
        assert_eq!(v["data"]["message"], "another participant is speaking");
    }

    #[test]
    fn audio_chunk_shape() {
        let msg = ServerMessage::AudioChunk {
            response_id: "r".into(),
            sequence: 3,
            audio: "AAAA".into(),
            duration_ms: 20,
            is_first: false,
            is_last: false,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["event"], "ai:audio_chunk");
        assert_eq!(v["data"]["responseId"], "r");
        assert_eq!(v["data"]["durationMs"], 20);
    }

    #[test]
    fn server_messages_round_trip_through_json() {
        let msg = ServerMessage::PeerLeft {
            peer_id: "p".into(),
            reason: "disconnect".into(),
        };
        let back: ServerMessage = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, msg);
    }
}
