//! Room, peer and AI-session view types shared by the room actor and the
//! wire protocol.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Active,
    Full,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptSettings {
    /// Broadcast `transcript:entry` for every stored entry.
    pub enabled: bool,
    /// Accept `transcript:ambient` speech.
    pub ambient: bool,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ambient: true,
        }
    }
}

/// Room configuration as supplied by the room-config collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomConfig {
    pub name: String,
    pub personality: Option<String>,
    pub topic: Option<String>,
    pub custom_instructions: Option<String>,
    pub max_participants: Option<u32>,
    pub transcript: TranscriptSettings,
    /// The collaborator reports the room as closed.
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub status: RoomStatus,
    pub participant_count: u32,
    pub max_participants: u32,
    pub personality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    pub transcript: TranscriptSettings,
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    Owner,
    Moderator,
    Participant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connected,
    Connecting,
    Reconnecting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub connection_state: ConnectionState,
    pub muted: bool,
    pub speaking: bool,
    pub addressing_ai: bool,
    pub audio_level: f32,
    /// Unix epoch milliseconds.
    pub last_active_at: i64,
    pub idle: bool,
}

impl Presence {
    pub fn new(now_ms: i64) -> Self {
        Self {
            connection_state: ConnectionState::Connected,
            muted: false,
            speaking: false,
            addressing_ai: false,
            audio_level: 0.0,
            last_active_at: now_ms,
            idle: false,
        }
    }
}

/// Partial presence update sent by a client; absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresencePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_state: Option<ConnectionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaking: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addressing_ai: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_level: Option<f32>,
}

impl Presence {
    pub fn apply(&mut self, patch: &PresencePatch, now_ms: i64) {
        if let Some(v) = patch.connection_state {
            self.connection_state = v;
        }
        if let Some(v) = patch.muted {
            self.muted = v;
        }
        if let Some(v) = patch.speaking {
            self.speaking = v;
        }
        if let Some(v) = patch.addressing_ai {
            self.addressing_ai = v;
        }
        if let Some(v) = patch.audio_level {
            self.audio_level = v.clamp(0.0, 1.0);
        }
        self.last_active_at = now_ms;
        self.idle = false;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: PeerRole,
    pub presence: Presence,
    /// Unix epoch milliseconds.
    pub joined_at: i64,
}

// ---------------------------------------------------------------------------
// AI session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiStateView {
    pub state: AiState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_speaker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_speaker_name: Option<String>,
    pub is_interrupted: bool,
}
