//! Upstream realtime voice-AI wire events.
//!
//! Every frame is a JSON object discriminated by its `type` field. Unknown
//! inbound kinds deserialize to [`RealtimeServerEvent::Other`] so a newer
//! upstream never breaks the dispatch table.

use serde::{Deserialize, Serialize};

use crate::AiError;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioCommit,

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioClear,

    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseOptions },

    #[serde(rename = "response.cancel")]
    ResponseCancel,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

impl RealtimeClientEvent {
    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioCommit => "input_audio_buffer.commit",
            Self::InputAudioClear => "input_audio_buffer.clear",
            Self::ResponseCreate { .. } => "response.create",
            Self::ResponseCancel => "response.cancel",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
        }
    }

    pub fn to_json(&self) -> Result<String, AiError> {
        serde_json::to_string(self).map_err(|e| AiError::ParseError(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub instructions: String,
    pub voice: String,
    pub modalities: Vec<String>,
    pub input_audio_format: String,
    pub output_audio_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    /// Always `null`: turns are gated by push-to-talk, not server VAD.
    pub turn_detection: Option<serde_json::Value>,
}

impl SessionConfig {
    pub fn push_to_talk(instructions: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            voice: voice.into(),
            modalities: vec!["text".into(), "audio".into()],
            input_audio_format: "pcm16".into(),
            output_audio_format: "pcm16".into(),
            input_audio_transcription: Some(TranscriptionConfig {
                model: "whisper-1".into(),
            }),
            turn_detection: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseOptions {
    pub modalities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl ResponseOptions {
    pub fn audio(instructions: Option<String>) -> Self {
        Self {
            modalities: vec!["text".into(), "audio".into()],
            instructions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A text message item, used to inject room context as a system turn.
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        let part_type = if role == "assistant" { "text" } else { "input_text" };
        Self {
            item_type: "message".into(),
            role: role.into(),
            content: vec![ContentPart {
                part_type: part_type.into(),
                text: text.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseRef },

    #[serde(rename = "response.audio.delta")]
    AudioDelta { response_id: String, delta: String },

    #[serde(rename = "response.audio.done")]
    AudioDone { response_id: String },

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        response_id: String,
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    InputTranscriptionFailed {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        error: Option<ErrorDetail>,
    },

    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseRef },

    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    #[serde(other)]
    Other,
}

impl RealtimeServerEvent {
    pub fn parse(text: &str) -> Result<Self, AiError> {
        serde_json::from_str(text).map_err(|e| AiError::ParseError(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRef {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}
