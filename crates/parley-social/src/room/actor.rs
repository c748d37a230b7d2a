use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_ai::audio::{decode_pcm16, pcm16_duration_ms};
use parley_ai::realtime::LinkEvent;
use parley_ai::{
    ContextManager, ConversationMessage, LinkSender, RealtimeClientEvent, RealtimeLink,
    RealtimeServerEvent, StructuredSummary, SummarizationMonitor, SummaryRequest,
};
use parley_common::{now_ms, RoomError};

use super::timers::{TimerId, TimerKind, Timers};
use super::ServerServices;
use crate::broadcast::{BroadcastAction, ResponseBroadcastManager};
use crate::peers::{PeerDirectory, PeerTx};
use crate::protocol::{ClientMessage, ErrorPayload, ServerMessage};
use crate::reconnect::{
    ConnectionKind, ReconnectError, ReconnectState, ReconnectionManager, ReconnectionStatus,
};
use crate::signaling::{self, Signal};
use crate::turn::{PersonaSettings, TurnController, TurnEffect};
use crate::types::{Peer, RoomConfig};

const DEFAULT_HISTORY_PAGE: usize = 50;
const MAX_HISTORY_PAGE: usize = 200;

pub enum RoomCommand {
    Join {
        display_name: String,
        avatar: Option<String>,
        peer_id: Option<String>,
        tx: PeerTx,
        reply: oneshot::Sender<Result<Peer, RoomError>>,
    },
    Leave {
        peer_id: String,
        reason: String,
    },
    Client {
        peer_id: String,
        message: ClientMessage,
    },
    LinkOpened {
        link_id: u64,
        link: RealtimeLink,
        reconnected: bool,
    },
    LinkFailed {
        link_id: u64,
        reason: String,
    },
    Upstream {
        link_id: u64,
        event: RealtimeServerEvent,
    },
    LinkClosed {
        link_id: u64,
        reason: String,
    },
    ReconnectProgress {
        link_id: u64,
        attempt: u32,
        max_attempts: u32,
    },
    ReconnectFailed {
        link_id: u64,
        reason: String,
    },
    Timer(TimerId),
    SummaryReady {
        request: SummaryRequest,
        summary: StructuredSummary,
    },
    OnDemandSummary {
        peer_id: String,
        summary: StructuredSummary,
    },
    /// The LLM summarizer failed; a heuristic summary follows.
    SummaryFailed {
        error: String,
    },
    Close {
        reason: String,
    },
    Shutdown,
}

/// What a room tells the registry about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomReport {
    Occupancy {
        room_id: String,
        count: u32,
        joins_processed: u64,
    },
    Stopped {
        room_id: String,
    },
}

/// Address of a running room.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: String,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.tx
            .send(command)
            .map_err(|_| RoomError::RoomUnavailable)
    }

    pub fn leave(&self, peer_id: &str, reason: &str) -> Result<(), RoomError> {
        self.send(RoomCommand::Leave {
            peer_id: peer_id.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn client(&self, peer_id: &str, message: ClientMessage) -> Result<(), RoomError> {
        self.send(RoomCommand::Client {
            peer_id: peer_id.to_string(),
            message,
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Spawn the actor for `room_id`.
    pub fn spawn(
        room_id: &str,
        config: &RoomConfig,
        services: ServerServices,
        reports: mpsc::UnboundedSender<RoomReport>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = RoomActor::new(room_id, config, services, tx.clone(), rx, reports);
        tokio::spawn(actor.run());
        Self {
            room_id: room_id.to_string(),
            tx,
        }
    }
}

fn now() -> i64 {
    now_ms() as i64
}

struct RoomActor {
    room_id: String,
    services: ServerServices,
    directory: PeerDirectory,
    persona: PersonaSettings,
    turn: TurnController,
    broadcast: ResponseBroadcastManager,
    context: ContextManager,
    monitor: SummarizationMonitor,
    timers: Timers<RoomCommand>,
    link: Option<(u64, LinkSender)>,
    reconnect_cancel: Option<CancellationToken>,
    tx: mpsc::UnboundedSender<RoomCommand>,
    rx: mpsc::UnboundedReceiver<RoomCommand>,
    reports: mpsc::UnboundedSender<RoomReport>,
    joins_processed: u64,
}

impl RoomActor {
    fn new(
        room_id: &str,
        config: &RoomConfig,
        mut services: ServerServices,
        tx: mpsc::UnboundedSender<RoomCommand>,
        rx: mpsc::UnboundedReceiver<RoomCommand>,
        reports: mpsc::UnboundedSender<RoomReport>,
    ) -> Self {
        let settings = Arc::clone(&services.settings);
        let hook_tx = tx.clone();
        services.summarization = services.summarization.with_error_hook(move |e| {
            let _ = hook_tx.send(RoomCommand::SummaryFailed {
                error: e.to_string(),
            });
        });
        let directory = PeerDirectory::new(
            room_id,
            config,
            &settings.default_personality,
            settings.max_participants,
        );
        let persona = PersonaSettings::new(
            directory.personality(),
            directory.topic(),
            directory.custom_instructions(),
        );
        let mut context = ContextManager::new(settings.context.clone());
        context.set_system_prompt(persona.session_instructions(None));

        Self {
            room_id: room_id.to_string(),
            turn: TurnController::new(persona.clone(), settings.turn.clone()),
            broadcast: ResponseBroadcastManager::new(settings.broadcast.clone()),
            monitor: SummarizationMonitor::new(settings.summarization.clone(), Instant::now()),
            timers: Timers::new(tx.clone(), RoomCommand::Timer),
            directory,
            persona,
            context,
            services,
            link: None,
            reconnect_cancel: None,
            tx,
            rx,
            reports,
            joins_processed: 0,
        }
    }

    async fn run(mut self) {
        info!(room_id = %self.room_id, "Room started");
        self.timers
            .arm(TimerKind::SummaryCheck, self.services.settings.summary_check_interval);
        self.timers.arm(TimerKind::PresenceSweep, self.sweep_interval());

        while let Some(command) = self.rx.recv().await {
            match command {
                RoomCommand::Shutdown => break,
                command => self.handle(command),
            }
        }

        self.teardown_session();
        self.timers.cancel_all();
        let _ = self.reports.send(RoomReport::Stopped {
            room_id: self.room_id.clone(),
        });
        info!(room_id = %self.room_id, "Room stopped");
    }

    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                display_name,
                avatar,
                peer_id,
                tx,
                reply,
            } => {
                let result = self.join(&display_name, avatar, peer_id, tx);
                let _ = reply.send(result);
                self.report_occupancy();
            }
            RoomCommand::Leave { peer_id, reason } => self.leave(&peer_id, &reason),
            RoomCommand::Client { peer_id, message } => self.client(&peer_id, message),
            RoomCommand::LinkOpened {
                link_id,
                link,
                reconnected,
            } => self.link_opened(link_id, link, reconnected),
            RoomCommand::LinkFailed { link_id, reason } => {
                self.cancel_connect_timeout(link_id);
                let effects = self.turn.on_link_failed(link_id, &reason);
                self.apply(effects);
            }
            RoomCommand::Upstream { link_id, event } => {
                let effects = self.turn.handle_upstream(link_id, event);
                self.apply(effects);
            }
            RoomCommand::LinkClosed { link_id, reason } => self.link_closed(link_id, &reason),
            RoomCommand::ReconnectProgress {
                link_id,
                attempt,
                max_attempts,
            } => {
                if self.turn.link_id() == Some(link_id) {
                    self.directory.broadcast(&ServerMessage::AiReconnecting {
                        attempt,
                        max_attempts,
                    });
                }
            }
            RoomCommand::ReconnectFailed { link_id, reason } => {
                if self.turn.link_id() != Some(link_id) {
                    return;
                }
                self.reconnect_cancel = None;
                let effects = self.turn.on_link_failed(link_id, &reason);
                self.apply(effects);
                self.directory
                    .broadcast(&ServerMessage::AiReconnectFailed { reason });
            }
            RoomCommand::Timer(id) => {
                if let Some(kind) = self.timers.fire(id) {
                    self.timer(kind);
                }
            }
            RoomCommand::SummaryReady { request, summary } => {
                if let Some(summary) = self
                    .context
                    .complete_summarization(&request, summary.render())
                {
                    if self.directory.transcript_settings().enabled {
                        self.directory
                            .broadcast(&ServerMessage::Summarized { summary });
                    }
                }
            }
            RoomCommand::OnDemandSummary { peer_id, summary } => {
                self.directory
                    .send_to(&peer_id, ServerMessage::Summary { summary });
            }
            RoomCommand::SummaryFailed { error } => {
                warn!(room_id = %self.room_id, error = %error, "LLM summary failed; heuristic summary used");
                self.directory.broadcast(&ServerMessage::AiError {
                    message: format!("Summarization failed: {error}"),
                    code: Some("SUMMARIZATION_FAILED".into()),
                });
            }
            RoomCommand::Close { reason } => self.close(&reason),
            RoomCommand::Shutdown => {}
        }
    }

    // -- Membership ---------------------------------------------------------

    fn join(
        &mut self,
        display_name: &str,
        avatar: Option<String>,
        requested_id: Option<String>,
        tx: PeerTx,
    ) -> Result<Peer, RoomError> {
        self.joins_processed += 1;
        let peer = match self.directory.join(display_name, avatar, requested_id, tx, now()) {
            Ok(peer) => peer,
            Err(e) => {
                debug!(room_id = %self.room_id, error = %e, "Join rejected");
                return Err(e);
            }
        };

        let others: Vec<Peer> = self
            .directory
            .peers()
            .filter(|p| p.id != peer.id)
            .cloned()
            .collect();
        self.directory.send_to(
            &peer.id,
            ServerMessage::Joined {
                room: self.directory.info(),
                local_peer: peer.clone(),
                peers: others,
                ai_state: self.turn.view(),
            },
        );
        self.directory
            .broadcast_except(&peer.id, &ServerMessage::PeerJoined { peer: peer.clone() });
        self.broadcast_room_updated();
        self.context.set_participant(&peer.id, &peer.display_name);

        let actions = self.broadcast.add_peer(&peer.id);
        self.run_broadcast(actions);
        Ok(peer)
    }

    fn leave(&mut self, peer_id: &str, reason: &str) {
        if self.directory.leave(peer_id).is_none() {
            return;
        }
        self.directory.broadcast(&ServerMessage::PeerLeft {
            peer_id: peer_id.to_string(),
            reason: reason.to_string(),
        });
        self.broadcast_room_updated();
        self.context.remove_participant(peer_id);

        let effects = self.turn.on_peer_left(peer_id);
        self.apply(effects);
        let actions = self.broadcast.remove_peer(peer_id, now());
        self.run_broadcast(actions);

        if self.directory.is_empty() {
            self.teardown_session();
        }
        self.report_occupancy();
    }

    fn close(&mut self, reason: &str) {
        if self.directory.is_closed() {
            return;
        }
        self.directory.broadcast(&ServerMessage::RoomClosed {
            reason: reason.to_string(),
        });
        let removed = self.directory.close();
        info!(room_id = %self.room_id, peers = removed.len(), reason, "Room closed");
        self.teardown_session();
        self.report_occupancy();
    }

    /// Release the AI session and conversation once nobody is left.
    fn teardown_session(&mut self) {
        if let Some(cancel) = self.reconnect_cancel.take() {
            cancel.cancel();
        }
        let effects = self.turn.teardown();
        self.apply(effects);
        self.close_link();
        self.broadcast.clear();
        self.context.clear();
        self.context
            .set_system_prompt(self.persona.session_instructions(None));
        self.monitor = SummarizationMonitor::new(
            self.services.settings.summarization.clone(),
            Instant::now(),
        );
        self.timers.cancel_where(|k| {
            matches!(
                k,
                TimerKind::ConnectTimeout { .. } | TimerKind::BroadcastWait { .. }
            )
        });
        debug!(room_id = %self.room_id, "AI session and context released");
    }

    fn report_occupancy(&self) {
        let _ = self.reports.send(RoomReport::Occupancy {
            room_id: self.room_id.clone(),
            count: self.directory.participant_count(),
            joins_processed: self.joins_processed,
        });
    }

    fn broadcast_room_updated(&self) {
        self.directory.broadcast(&ServerMessage::RoomUpdated {
            room: self.directory.info(),
        });
    }

    // -- Client events ------------------------------------------------------

    fn client(&mut self, peer_id: &str, message: ClientMessage) {
        if !self.directory.contains(peer_id) {
            debug!(room_id = %self.room_id, peer = %peer_id, event = message.event_name(), "Event from non-member ignored");
            return;
        }
        debug!(room_id = %self.room_id, peer = %peer_id, event = message.event_name(), "Client event");

        match message {
            ClientMessage::Join(_) => {
                debug!(peer = %peer_id, "Duplicate join ignored");
            }
            ClientMessage::Leave => self.leave(peer_id, "left"),
            ClientMessage::Offer {
                target_peer_id,
                sdp,
            } => {
                signaling::relay(&self.directory, peer_id, &target_peer_id, Signal::Offer { sdp });
            }
            ClientMessage::Answer {
                target_peer_id,
                sdp,
            } => {
                signaling::relay(&self.directory, peer_id, &target_peer_id, Signal::Answer { sdp });
            }
            ClientMessage::Ice {
                target_peer_id,
                candidate,
            } => {
                signaling::relay(
                    &self.directory,
                    peer_id,
                    &target_peer_id,
                    Signal::Ice { candidate },
                );
            }
            ClientMessage::PresenceUpdate(patch) => {
                if let Some(presence) = self.directory.update_presence(peer_id, &patch, now()) {
                    self.directory.broadcast(&ServerMessage::PresenceUpdated {
                        peer_id: peer_id.to_string(),
                        presence,
                    });
                }
            }
            ClientMessage::Heartbeat => {
                if let Some(presence) = self.directory.heartbeat(peer_id, now()) {
                    self.directory.broadcast(&ServerMessage::PresenceUpdated {
                        peer_id: peer_id.to_string(),
                        presence,
                    });
                }
            }
            ClientMessage::UpdateName { display_name } => {
                let name = display_name.trim();
                if name.is_empty() || !self.directory.rename(peer_id, name) {
                    return;
                }
                self.context.set_participant(peer_id, name);
                self.directory.broadcast(&ServerMessage::NameUpdated {
                    peer_id: peer_id.to_string(),
                    display_name: name.to_string(),
                });
            }
            ClientMessage::RequestTurn | ClientMessage::PttStart => self.ptt_start(peer_id),
            ClientMessage::PttEnd => {
                let others = self.directory.other_names(peer_id);
                let effects = self.turn.ptt_end(peer_id, &others);
                self.apply(effects);
            }
            ClientMessage::CancelTurn => {
                let effects = self.turn.cancel_turn(peer_id);
                self.apply(effects);
            }
            ClientMessage::Interrupt => {
                let effects = self.turn.voice_interrupt(Some(peer_id), "manual");
                self.apply(effects);
            }
            ClientMessage::VoiceInterrupt { reason } => {
                let reason = reason.unwrap_or_else(|| "voice".to_string());
                let effects = self.turn.voice_interrupt(Some(peer_id), &reason);
                self.apply(effects);
            }
            ClientMessage::AudioData { audio } => {
                if let Err(e) = decode_pcm16(&audio) {
                    debug!(peer = %peer_id, error = %e, "Malformed audio dropped");
                    return;
                }
                let effects = self.turn.stream_audio(peer_id, audio);
                self.apply(effects);
            }
            ClientMessage::BufferStatus { ready, buffered_ms } => {
                let actions = self.broadcast.set_ready(peer_id, ready, buffered_ms, now());
                self.run_broadcast(actions);
            }
            ClientMessage::RequestHistory { limit, before } => {
                let limit = limit
                    .unwrap_or(DEFAULT_HISTORY_PAGE)
                    .clamp(1, MAX_HISTORY_PAGE);
                let page = self.context.history(limit, before.as_deref());
                self.directory
                    .send_to(peer_id, ServerMessage::History(page));
            }
            ClientMessage::Ambient { text } => {
                let text = text.trim();
                if text.is_empty() || !self.directory.transcript_settings().ambient {
                    return;
                }
                let name = self.peer_name(peer_id);
                let entry = self.context.add_ambient_message(peer_id, &name, text);
                self.record_entry(entry);
            }
            ClientMessage::GenerateSummary => self.on_demand_summary(peer_id),
        }
    }

    fn peer_name(&self, peer_id: &str) -> String {
        self.directory
            .get(peer_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_default()
    }

    fn ptt_start(&mut self, peer_id: &str) {
        let name = self.peer_name(peer_id);
        let recent = self
            .context
            .recent_context(self.services.settings.context_token_budget);
        match self.turn.ptt_start(peer_id, &name, &recent) {
            Ok(effects) => {
                self.apply(effects);
                self.directory.send_to(peer_id, ServerMessage::TurnGranted);
            }
            Err(e) => {
                debug!(room_id = %self.room_id, peer = %peer_id, error = %e, "Turn denied");
                self.directory
                    .send_to(peer_id, ServerMessage::TurnDenied(ErrorPayload::from(&e)));
            }
        }
    }

    // -- Effects ------------------------------------------------------------

    fn apply(&mut self, effects: Vec<TurnEffect>) {
        for effect in effects {
            match effect {
                TurnEffect::Broadcast(message) => self.directory.broadcast(&message),
                TurnEffect::Upstream(event) => self.send_upstream(event),
                TurnEffect::OpenLink { link_id } => self.open_link(link_id),
                TurnEffect::CloseLink => self.close_link(),
                TurnEffect::StartResponse {
                    response_id,
                    trigger_peer_id,
                } => {
                    let actions = self
                        .broadcast
                        .start_response(&response_id, trigger_peer_id, now());
                    self.run_broadcast(actions);
                }
                TurnEffect::ResponseAudio { response_id, audio } => {
                    let sample_rate = self.services.settings.sample_rate;
                    match pcm16_duration_ms(&audio, sample_rate) {
                        Ok(duration_ms) => {
                            let actions = self.broadcast.add_chunk(
                                &response_id,
                                audio,
                                duration_ms,
                                false,
                                now(),
                            );
                            self.run_broadcast(actions);
                        }
                        Err(e) => warn!(response = %response_id, error = %e, "Undecodable response audio dropped"),
                    }
                }
                TurnEffect::EndResponse { response_id } => {
                    let actions = self.broadcast.end_response(&response_id, now());
                    self.run_broadcast(actions);
                }
                TurnEffect::CancelResponse => {
                    let actions = self.broadcast.cancel_response(now());
                    self.run_broadcast(actions);
                }
                TurnEffect::UserTranscript {
                    speaker_id,
                    speaker_name,
                    text,
                } => {
                    let entry = self
                        .context
                        .add_user_message(&speaker_id, &speaker_name, &text);
                    self.record_entry(entry);
                }
                TurnEffect::AssistantTranscript { text } => {
                    let entry = self.context.add_assistant_message(&text);
                    self.record_entry(entry);
                }
            }
        }
    }

    fn run_broadcast(&mut self, actions: Vec<BroadcastAction>) {
        for action in actions {
            match action {
                BroadcastAction::Send { peer_id, message } => {
                    self.directory.send_to(&peer_id, message);
                }
                BroadcastAction::ArmWaitTimer { response_id, after } => {
                    self.timers
                        .cancel_where(|k| matches!(k, TimerKind::BroadcastWait { .. }));
                    self.timers
                        .arm(TimerKind::BroadcastWait { response_id }, after);
                }
                BroadcastAction::DisarmWaitTimer => {
                    self.timers
                        .cancel_where(|k| matches!(k, TimerKind::BroadcastWait { .. }));
                }
            }
        }
    }

    // -- Upstream link ------------------------------------------------------

    fn send_upstream(&self, event: RealtimeClientEvent) {
        match &self.link {
            Some((link_id, sender)) => {
                if let Err(e) = sender.send(event) {
                    warn!(room_id = %self.room_id, link_id, error = %e, "Upstream send failed");
                }
            }
            None => debug!(room_id = %self.room_id, kind = event.kind(), "No upstream link; event dropped"),
        }
    }

    fn open_link(&mut self, link_id: u64) {
        self.timers.arm(
            TimerKind::ConnectTimeout { link_id },
            self.services.settings.connect_timeout,
        );
        let connector = Arc::clone(&self.services.connector);
        let tx = self.tx.clone();
        info!(room_id = %self.room_id, link_id, "Connecting upstream link");
        tokio::spawn(async move {
            let command = match connector.connect().await {
                Ok(link) => RoomCommand::LinkOpened {
                    link_id,
                    link,
                    reconnected: false,
                },
                Err(e) => RoomCommand::LinkFailed {
                    link_id,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(command);
        });
    }

    fn close_link(&mut self) {
        if let Some((link_id, sender)) = self.link.take() {
            debug!(room_id = %self.room_id, link_id, "Closing upstream link");
            sender.close();
        }
    }

    fn cancel_connect_timeout(&mut self, link_id: u64) {
        self.timers
            .cancel_where(|k| *k == TimerKind::ConnectTimeout { link_id });
    }

    fn link_opened(&mut self, link_id: u64, link: RealtimeLink, reconnected: bool) {
        self.cancel_connect_timeout(link_id);
        let Some(effects) = self.turn.on_link_opened(link_id) else {
            debug!(room_id = %self.room_id, link_id, "Superseded link closed on arrival");
            link.sender.close();
            return;
        };

        self.close_link();
        let RealtimeLink { sender, mut events } = link;
        self.link = Some((link_id, sender));

        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let command = match event {
                    LinkEvent::Event(event) => RoomCommand::Upstream { link_id, event },
                    LinkEvent::Closed { reason } => RoomCommand::LinkClosed { link_id, reason },
                };
                if tx.send(command).is_err() {
                    break;
                }
            }
        });

        if reconnected {
            self.reconnect_cancel = None;
            self.directory.broadcast(&ServerMessage::AiReconnected);
        }
        self.apply(effects);
    }

    fn link_closed(&mut self, link_id: u64, reason: &str) {
        let Some(effects) = self.turn.on_link_closed(link_id, reason) else {
            return;
        };
        if self.link.as_ref().is_some_and(|(id, _)| *id == link_id) {
            self.link = None;
        }
        self.apply(effects);
        if !self.directory.is_empty() {
            self.start_reconnect(reason);
        }
    }

    /// Replace a lost link in the background with backoff.
    fn start_reconnect(&mut self, cause: &str) {
        let recent = self
            .context
            .recent_context(self.services.settings.context_token_budget);
        let link_id = self.turn.begin_reconnect(&recent);
        if let Some(old) = self.reconnect_cancel.take() {
            old.cancel();
        }
        let cancel = CancellationToken::new();
        self.reconnect_cancel = Some(cancel.clone());
        warn!(room_id = %self.room_id, link_id, cause, "Upstream link lost; reconnecting");

        let connector = Arc::clone(&self.services.connector);
        let policy = self.services.settings.reconnect.clone();
        let tx = self.tx.clone();
        let cause = cause.to_string();
        tokio::spawn(async move {
            let progress = tx.clone();
            let mut manager = ReconnectionManager::new(ConnectionKind::AiSession, policy).on_status(
                Arc::new(move |status: &ReconnectionStatus| {
                    if status.state == ReconnectState::Waiting {
                        let _ = progress.send(RoomCommand::ReconnectProgress {
                            link_id,
                            attempt: status.attempt,
                            max_attempts: status.max_attempts,
                        });
                    }
                }),
            );
            let result = manager
                .start_reconnection(
                    |_| {
                        let connector = Arc::clone(&connector);
                        async move { connector.connect().await.map_err(|e| e.to_string()) }
                    },
                    Some(cause),
                    &cancel,
                )
                .await;
            let command = match result {
                Ok((link, _)) => RoomCommand::LinkOpened {
                    link_id,
                    link,
                    reconnected: true,
                },
                Err(ReconnectError::Cancelled) => return,
                Err(e) => RoomCommand::ReconnectFailed {
                    link_id,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(command);
        });
    }

    // -- Transcript and summarization ---------------------------------------

    fn record_entry(&mut self, entry: ConversationMessage) {
        self.monitor.record_entry();
        if self.directory.transcript_settings().enabled {
            self.directory
                .broadcast(&ServerMessage::TranscriptEntry { entry });
        }
        if self.context.needs_summarization() {
            self.start_summarization();
        }
    }

    fn start_summarization(&mut self) {
        let Some(request) = self.context.begin_summarization() else {
            return;
        };
        self.monitor.mark_summarized(Instant::now());
        info!(room_id = %self.room_id, messages = request.messages.len(), "Summarizing conversation");
        let service = self.services.summarization.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let summary = service.summarize(&request.messages).await;
            let _ = tx.send(RoomCommand::SummaryReady { request, summary });
        });
    }

    fn on_demand_summary(&mut self, peer_id: &str) {
        let messages: Vec<ConversationMessage> = self.context.messages().cloned().collect();
        let service = self.services.summarization.clone();
        let tx = self.tx.clone();
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            let summary = service.summarize(&messages).await;
            let _ = tx.send(RoomCommand::OnDemandSummary { peer_id, summary });
        });
    }

    // -- Timers -------------------------------------------------------------

    fn sweep_interval(&self) -> Duration {
        (self.services.settings.idle_after / 4).max(Duration::from_secs(1))
    }

    fn timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::ConnectTimeout { link_id } => {
                let effects = self.turn.on_link_failed(link_id, "connection timed out");
                self.apply(effects);
            }
            TimerKind::BroadcastWait { response_id } => {
                let actions = self.broadcast.on_wait_timeout(&response_id, now());
                self.run_broadcast(actions);
            }
            TimerKind::SummaryCheck => {
                if let Some(trigger) = self.monitor.should_summarize(Instant::now()) {
                    debug!(room_id = %self.room_id, ?trigger, "Summary check fired");
                    self.start_summarization();
                }
                self.timers.arm(
                    TimerKind::SummaryCheck,
                    self.services.settings.summary_check_interval,
                );
            }
            TimerKind::PresenceSweep => {
                let idle_after = self.services.settings.idle_after.as_millis() as i64;
                for (peer_id, presence) in self.directory.sweep_idle(now(), idle_after) {
                    self.directory
                        .broadcast(&ServerMessage::PresenceUpdated { peer_id, presence });
                }
                self.timers
                    .arm(TimerKind::PresenceSweep, self.sweep_interval());
            }
        }
    }
}
