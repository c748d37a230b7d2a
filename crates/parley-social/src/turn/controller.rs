//! Push-to-talk turn state machine.
//!
//! The controller is pure: every operation mutates the session and returns
//! the effects the owning room must carry out (broadcasts, upstream frames,
//! broadcast-manager calls, transcript appends). It never performs I/O.

use tracing::{debug, info, warn};

use parley_ai::realtime::{
    ConversationItem, RealtimeClientEvent, RealtimeServerEvent, ResponseOptions, SessionConfig,
};
use parley_common::RoomError;

use super::personality::PersonaSettings;
use crate::protocol::ServerMessage;
use crate::types::{AiState, AiStateView};

/// Upstream error code returned when cancelling with nothing to cancel.
const CANCEL_NOT_ACTIVE: &str = "response_cancel_not_active";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    pub id: String,
    pub name: String,
}

/// The room's AI session.
///
/// `last_speaker` outlives the turn so a transcription that arrives after
/// `response.done` is still attributed: attribution uses `active_speaker`,
/// falling back to `last_speaker`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiSession {
    pub state: AiState,
    pub active_speaker: Option<Speaker>,
    pub last_speaker: Option<Speaker>,
    pub is_interrupted: bool,
    pub expected_response_id: Option<String>,
}

#[derive(Debug)]
enum LinkState {
    Closed,
    Connecting {
        link_id: u64,
        pending: Vec<RealtimeClientEvent>,
    },
    Open {
        link_id: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEffect {
    Broadcast(ServerMessage),
    Upstream(RealtimeClientEvent),
    /// Start connecting a new upstream link tagged `link_id`.
    OpenLink { link_id: u64 },
    CloseLink,
    StartResponse {
        response_id: String,
        trigger_peer_id: Option<String>,
    },
    ResponseAudio { response_id: String, audio: String },
    EndResponse { response_id: String },
    CancelResponse,
    UserTranscript {
        speaker_id: String,
        speaker_name: String,
        text: String,
    },
    AssistantTranscript { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSettings {
    pub voice: String,
    pub min_transcript_chars: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            voice: "alloy".into(),
            min_transcript_chars: 5,
        }
    }
}

pub struct TurnController {
    session: AiSession,
    link: LinkState,
    persona: PersonaSettings,
    settings: TurnSettings,
    /// Upstream response that has been created and not yet finished,
    /// whether or not its audio is being accepted.
    in_flight: Option<String>,
    /// A `response.create` went upstream and has not been acknowledged.
    create_pending: bool,
    next_link_id: u64,
}

impl TurnController {
    pub fn new(persona: PersonaSettings, settings: TurnSettings) -> Self {
        Self {
            session: AiSession::default(),
            link: LinkState::Closed,
            persona,
            settings,
            in_flight: None,
            create_pending: false,
            next_link_id: 1,
        }
    }

    pub fn session(&self) -> &AiSession {
        &self.session
    }

    pub fn state(&self) -> AiState {
        self.session.state
    }

    pub fn view(&self) -> AiStateView {
        AiStateView {
            state: self.session.state,
            active_speaker_id: self.session.active_speaker.as_ref().map(|s| s.id.clone()),
            active_speaker_name: self.session.active_speaker.as_ref().map(|s| s.name.clone()),
            is_interrupted: self.session.is_interrupted,
        }
    }

    /// Id of the current link, connecting or open.
    pub fn link_id(&self) -> Option<u64> {
        match self.link {
            LinkState::Closed => None,
            LinkState::Connecting { link_id, .. } | LinkState::Open { link_id } => Some(link_id),
        }
    }

    pub fn is_link_open(&self) -> bool {
        matches!(self.link, LinkState::Open { .. })
    }

    pub fn is_active(&self) -> bool {
        self.session.state != AiState::Idle || !matches!(self.link, LinkState::Closed)
    }

    fn state_effect(&self) -> TurnEffect {
        TurnEffect::Broadcast(ServerMessage::AiState(self.view()))
    }

    fn send(&mut self, effects: &mut Vec<TurnEffect>, event: RealtimeClientEvent) {
        match &mut self.link {
            LinkState::Open { .. } => effects.push(TurnEffect::Upstream(event)),
            LinkState::Connecting { pending, .. } => pending.push(event),
            LinkState::Closed => debug!(kind = event.kind(), "No upstream link; event dropped"),
        }
    }

    fn allocate_link(&mut self, speaker: Option<&str>, recent_context: &str) -> u64 {
        let link_id = self.next_link_id;
        self.next_link_id += 1;
        let mut pending = vec![RealtimeClientEvent::SessionUpdate {
            session: SessionConfig::push_to_talk(
                self.persona.session_instructions(speaker),
                self.settings.voice.clone(),
            ),
        }];
        if !recent_context.trim().is_empty() {
            pending.push(RealtimeClientEvent::ConversationItemCreate {
                item: ConversationItem::text(
                    "system",
                    format!("Recent conversation in this room:\n{recent_context}"),
                ),
            });
        }
        self.link = LinkState::Connecting { link_id, pending };
        link_id
    }

    fn is_holding_turn(&self, peer_id: &str) -> bool {
        matches!(self.session.state, AiState::Listening | AiState::Processing)
            && self
                .session
                .active_speaker
                .as_ref()
                .is_some_and(|s| s.id == peer_id)
    }

    /// Cancel the upstream response, including one requested but not yet
    /// created.
    fn cancel_upstream(&mut self, effects: &mut Vec<TurnEffect>) {
        if self.in_flight.is_some() || self.create_pending {
            self.send(effects, RealtimeClientEvent::ResponseCancel);
        }
    }

    fn reset_to_idle(&mut self) {
        self.session.state = AiState::Idle;
        self.session.active_speaker = None;
    }

    // -- Turn operations ----------------------------------------------------

    /// Open a turn for `peer_id`.
    ///
    /// Blocked while a different peer is listening or processing. On
    /// acceptance any in-flight response is cancelled, late chunks are
    /// suppressed and the link is opened or retargeted at the new speaker.
    pub fn ptt_start(
        &mut self,
        peer_id: &str,
        name: &str,
        recent_context: &str,
    ) -> Result<Vec<TurnEffect>, RoomError> {
        if let Some(active) = &self.session.active_speaker {
            if matches!(self.session.state, AiState::Listening | AiState::Processing)
                && active.id != peer_id
            {
                return Err(RoomError::PttBlocked {
                    active_speaker_id: active.id.clone(),
                });
            }
        }

        let mut effects = Vec::new();
        self.cancel_upstream(&mut effects);
        self.send(&mut effects, RealtimeClientEvent::InputAudioClear);
        effects.push(TurnEffect::CancelResponse);

        self.session.is_interrupted = true;
        self.session.expected_response_id = None;
        effects.push(TurnEffect::Broadcast(ServerMessage::Interrupted {
            reason: "new_turn".into(),
            by_peer_id: Some(peer_id.to_string()),
        }));

        let speaker = Speaker {
            id: peer_id.to_string(),
            name: name.to_string(),
        };
        self.session.state = AiState::Listening;
        self.session.active_speaker = Some(speaker.clone());
        self.session.last_speaker = Some(speaker);

        match self.link {
            LinkState::Closed => {
                let link_id = self.allocate_link(Some(name), recent_context);
                effects.push(TurnEffect::OpenLink { link_id });
            }
            _ => {
                let event = RealtimeClientEvent::SessionUpdate {
                    session: SessionConfig::push_to_talk(
                        self.persona.session_instructions(Some(name)),
                        self.settings.voice.clone(),
                    ),
                };
                self.send(&mut effects, event);
            }
        }

        info!(peer = %peer_id, "PTT turn started");
        effects.push(self.state_effect());
        Ok(effects)
    }

    /// Forward audio while `peer_id` holds a listening turn; otherwise drop.
    pub fn stream_audio(&mut self, peer_id: &str, audio: String) -> Vec<TurnEffect> {
        let mut effects = Vec::new();
        if self.session.state == AiState::Listening && self.is_holding_turn(peer_id) {
            self.send(&mut effects, RealtimeClientEvent::InputAudioAppend { audio });
        } else {
            debug!(peer = %peer_id, "Audio outside an active turn dropped");
        }
        effects
    }

    /// Close `peer_id`'s turn and ask for a response.
    pub fn ptt_end(&mut self, peer_id: &str, other_names: &[String]) -> Vec<TurnEffect> {
        let mut effects = Vec::new();
        if !(self.session.state == AiState::Listening && self.is_holding_turn(peer_id)) {
            debug!(peer = %peer_id, "PTT end without an open turn ignored");
            return effects;
        }
        let speaker = self
            .session
            .active_speaker
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default();

        self.session.state = AiState::Processing;
        self.session.is_interrupted = false;
        self.create_pending = true;
        self.send(&mut effects, RealtimeClientEvent::InputAudioCommit);
        let instructions = self.persona.response_instructions(&speaker, other_names);
        self.send(
            &mut effects,
            RealtimeClientEvent::ResponseCreate {
                response: ResponseOptions::audio(Some(instructions)),
            },
        );
        info!(peer = %peer_id, "PTT turn ended; awaiting response");
        effects.push(self.state_effect());
        effects
    }

    /// Abandon `peer_id`'s own listening turn without committing audio.
    pub fn cancel_turn(&mut self, peer_id: &str) -> Vec<TurnEffect> {
        let mut effects = Vec::new();
        if !(self.session.state == AiState::Listening && self.is_holding_turn(peer_id)) {
            return effects;
        }
        self.send(&mut effects, RealtimeClientEvent::InputAudioClear);
        self.reset_to_idle();
        info!(peer = %peer_id, "PTT turn cancelled");
        effects.push(self.state_effect());
        effects
    }

    /// Force-cancel whatever the AI is doing, regardless of state.
    pub fn voice_interrupt(&mut self, by_peer_id: Option<&str>, reason: &str) -> Vec<TurnEffect> {
        let mut effects = Vec::new();
        self.cancel_upstream(&mut effects);
        self.send(&mut effects, RealtimeClientEvent::InputAudioClear);
        effects.push(TurnEffect::CancelResponse);

        self.session.is_interrupted = true;
        self.session.expected_response_id = None;
        self.reset_to_idle();

        info!(by = ?by_peer_id, reason, "AI interrupted");
        effects.push(TurnEffect::Broadcast(ServerMessage::Interrupted {
            reason: reason.to_string(),
            by_peer_id: by_peer_id.map(str::to_string),
        }));
        effects.push(self.state_effect());
        effects
    }

    /// A member left. Releases their turn if they were still talking.
    pub fn on_peer_left(&mut self, peer_id: &str) -> Vec<TurnEffect> {
        if self.session.state == AiState::Listening && self.is_holding_turn(peer_id) {
            return self.cancel_turn(peer_id);
        }
        Vec::new()
    }

    // -- Upstream events ----------------------------------------------------

    pub fn handle_upstream(&mut self, link_id: u64, event: RealtimeServerEvent) -> Vec<TurnEffect> {
        let mut effects = Vec::new();
        if !matches!(self.link, LinkState::Open { link_id: current } if current == link_id) {
            debug!(link_id, "Event from superseded link ignored");
            return effects;
        }

        match event {
            RealtimeServerEvent::SessionCreated | RealtimeServerEvent::SessionUpdated => {
                debug!(link_id, "Upstream session ready");
            }
            RealtimeServerEvent::ResponseCreated { response } => {
                self.in_flight = Some(response.id.clone());
                self.create_pending = false;
                if self.session.is_interrupted {
                    debug!(response = %response.id, "Response created while interrupted; cancelling");
                    self.send(&mut effects, RealtimeClientEvent::ResponseCancel);
                } else {
                    self.session.expected_response_id = Some(response.id.clone());
                    effects.push(TurnEffect::StartResponse {
                        response_id: response.id,
                        trigger_peer_id: self.session.last_speaker.as_ref().map(|s| s.id.clone()),
                    });
                }
            }
            RealtimeServerEvent::AudioDelta { response_id, delta } => {
                if self.session.is_interrupted
                    || self.session.expected_response_id.as_deref() != Some(response_id.as_str())
                {
                    debug!(response = %response_id, "Stale audio delta dropped");
                    return effects;
                }
                if self.session.state != AiState::Speaking {
                    self.session.state = AiState::Speaking;
                    effects.push(self.state_effect());
                }
                effects.push(TurnEffect::ResponseAudio {
                    response_id,
                    audio: delta,
                });
            }
            RealtimeServerEvent::AudioDone { response_id } => {
                debug!(response = %response_id, "Upstream audio done");
            }
            RealtimeServerEvent::AudioTranscriptDone {
                response_id,
                transcript,
            } => {
                if self.session.expected_response_id.as_deref() == Some(response_id.as_str())
                    && !transcript.trim().is_empty()
                {
                    effects.push(TurnEffect::AssistantTranscript {
                        text: transcript.trim().to_string(),
                    });
                }
            }
            RealtimeServerEvent::InputTranscriptionCompleted { transcript, .. } => {
                let text = transcript.trim();
                if text.chars().count() < self.settings.min_transcript_chars {
                    debug!(chars = text.chars().count(), "Short transcript discarded");
                    return effects;
                }
                let speaker = self
                    .session
                    .active_speaker
                    .as_ref()
                    .or(self.session.last_speaker.as_ref());
                match speaker {
                    Some(s) => effects.push(TurnEffect::UserTranscript {
                        speaker_id: s.id.clone(),
                        speaker_name: s.name.clone(),
                        text: text.to_string(),
                    }),
                    None => debug!("Transcript with no known speaker discarded"),
                }
            }
            RealtimeServerEvent::InputTranscriptionFailed { item_id, error } => {
                warn!(
                    item = %item_id,
                    error = %error.map(|e| e.message).unwrap_or_default(),
                    "Input transcription failed"
                );
            }
            RealtimeServerEvent::ResponseDone { response } => {
                if self.in_flight.as_deref() == Some(response.id.as_str()) {
                    self.in_flight = None;
                }
                if self.session.expected_response_id.as_deref() == Some(response.id.as_str()) {
                    self.session.expected_response_id = None;
                    self.reset_to_idle();
                    effects.push(TurnEffect::EndResponse {
                        response_id: response.id,
                    });
                    effects.push(self.state_effect());
                } else if self.session.state == AiState::Processing
                    && self.session.expected_response_id.is_none()
                    && !self.create_pending
                    && self.in_flight.is_none()
                {
                    // Our own create was rejected while this one was running.
                    debug!(response = %response.id, "Stale response done; no turn response pending");
                    self.reset_to_idle();
                    effects.push(self.state_effect());
                } else {
                    debug!(response = %response.id, "Done for a response that is not expected");
                }
            }
            RealtimeServerEvent::Error { error } => {
                if error.code.as_deref() == Some(CANCEL_NOT_ACTIVE) {
                    debug!("Cancel with no active response");
                    return effects;
                }
                warn!(code = ?error.code, message = %error.message, "Upstream error");
                effects.push(TurnEffect::Broadcast(ServerMessage::AiError {
                    message: error.message,
                    code: error.code,
                }));
                // An error while a create is unacknowledged rejects that create.
                self.create_pending = false;
                if self.session.state == AiState::Processing && self.in_flight.is_none() {
                    self.reset_to_idle();
                    effects.push(self.state_effect());
                }
            }
            RealtimeServerEvent::Other => {}
        }
        effects
    }

    // -- Link lifecycle -----------------------------------------------------

    /// The link `link_id` connected. Returns `None` when it was superseded,
    /// in which case the caller must close it.
    pub fn on_link_opened(&mut self, link_id: u64) -> Option<Vec<TurnEffect>> {
        match &mut self.link {
            LinkState::Connecting {
                link_id: current,
                pending,
            } if *current == link_id => {
                let effects: Vec<TurnEffect> = pending.drain(..).map(TurnEffect::Upstream).collect();
                self.link = LinkState::Open { link_id };
                info!(link_id, "Upstream link open");
                Some(effects)
            }
            _ => None,
        }
    }

    /// Connecting `link_id` failed or timed out.
    pub fn on_link_failed(&mut self, link_id: u64, reason: &str) -> Vec<TurnEffect> {
        let mut effects = Vec::new();
        if !matches!(self.link, LinkState::Connecting { link_id: current, .. } if current == link_id)
        {
            return effects;
        }
        self.link = LinkState::Closed;
        self.create_pending = false;
        warn!(link_id, reason, "Upstream link failed");
        effects.push(TurnEffect::Broadcast(ServerMessage::AiError {
            message: format!("AI connection failed: {reason}"),
            code: Some("AI_CONNECTION_FAILED".into()),
        }));
        if matches!(self.session.state, AiState::Listening | AiState::Processing) {
            self.reset_to_idle();
            effects.push(self.state_effect());
        }
        effects
    }

    /// An open link went away. Returns `None` for a superseded link.
    pub fn on_link_closed(&mut self, link_id: u64, reason: &str) -> Option<Vec<TurnEffect>> {
        if self.link_id() != Some(link_id) {
            return None;
        }
        self.link = LinkState::Closed;
        self.in_flight = None;
        self.create_pending = false;
        info!(link_id, reason, "Upstream link closed");

        let mut effects = Vec::new();
        if self.session.expected_response_id.take().is_some() {
            effects.push(TurnEffect::CancelResponse);
        }
        if self.session.state != AiState::Idle {
            self.reset_to_idle();
            effects.push(self.state_effect());
        }
        Some(effects)
    }

    /// Start a replacement link after an unexpected loss. The session is
    /// re-established with recent context once it opens.
    pub fn begin_reconnect(&mut self, recent_context: &str) -> u64 {
        self.allocate_link(None, recent_context)
    }

    /// The room emptied: drop the link and reset the session.
    pub fn teardown(&mut self) -> Vec<TurnEffect> {
        let mut effects = Vec::new();
        if !matches!(self.link, LinkState::Closed) {
            effects.push(TurnEffect::CloseLink);
        }
        effects.push(TurnEffect::CancelResponse);
        self.link = LinkState::Closed;
        self.in_flight = None;
        self.create_pending = false;
        self.session = AiSession::default();
        effects
    }
}
