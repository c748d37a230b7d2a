//! WebSocket client for a parley relay.
//!
//! [`RoomClient::connect`] dials the relay, joins a room and hands back an
//! event stream. A background task owns the socket: it forwards outbound
//! messages, keeps a [`RoomStateSnapshot`] current, and when the connection
//! drops it redials through a signaling [`ReconnectionManager`] whose restore
//! hook rejoins the room under the saved peer id.

mod state;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{ClientMessage, JoinRequest, ServerMessage};
use crate::reconnect::{
    ConnectionKind, ReconnectError, ReconnectPolicy, ReconnectState, ReconnectionManager,
    ReconnectionStatus, RoomStateSnapshot,
};
use crate::types::Peer;

pub use state::apply as apply_to_snapshot;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("timed out waiting for room:joined")]
    Timeout,
    #[error("join rejected ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct RoomClientConfig {
    /// Relay WebSocket URL, e.g. `ws://127.0.0.1:8787`.
    pub url: String,
    pub room_id: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub policy: ReconnectPolicy,
    pub join_timeout: Duration,
}

impl RoomClientConfig {
    pub fn new(
        url: impl Into<String>,
        room_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            room_id: room_id.into(),
            display_name: display_name.into(),
            avatar: None,
            policy: ReconnectPolicy::default(),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// What the client task reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Message(ServerMessage),
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// A new socket is up and the rejoin has been sent.
    Reconnected { attempt: u32 },
    /// The client stopped for good.
    Disconnected { reason: String },
}

pub struct RoomClient {
    local_peer: Peer,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    snapshot: Arc<RwLock<RoomStateSnapshot>>,
    cancel: CancellationToken,
}

impl RoomClient {
    /// Dial the relay and join `config.room_id`.
    ///
    /// Resolves once `room:joined` arrives; that message is also the first
    /// item on the returned event stream.
    pub async fn connect(
        config: RoomClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let mut socket = dial(&config.url).await?;
        let request = JoinRequest {
            room_id: config.room_id.clone(),
            display_name: config.display_name.clone(),
            avatar: config.avatar.clone(),
            peer_id: None,
        };
        send(&mut socket, &ClientMessage::Join(request)).await?;

        let joined = tokio::time::timeout(config.join_timeout, await_joined(&mut socket))
            .await
            .map_err(|_| ClientError::Timeout)??;

        let mut snapshot = RoomStateSnapshot {
            room_id: config.room_id.clone(),
            local_peer_id: String::new(),
            display_name: config.display_name.clone(),
            peers: Vec::new(),
            ai_session_active: false,
            timestamp: 0,
        };
        state::apply(&mut snapshot, &joined);
        let local_peer = match &joined {
            ServerMessage::Joined { local_peer, .. } => local_peer.clone(),
            _ => return Err(ClientError::Closed),
        };
        info!(room_id = %config.room_id, peer = %local_peer.id, "Joined room");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let _ = events.send(ClientEvent::Message(joined));

        let snapshot = Arc::new(RwLock::new(snapshot));
        let cancel = CancellationToken::new();
        let driver = Driver {
            url: config.url,
            avatar: config.avatar,
            policy: config.policy,
            snapshot: Arc::clone(&snapshot),
            outbound: outbound_rx,
            events,
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run(socket));

        Ok((
            Self {
                local_peer,
                outbound,
                snapshot,
                cancel,
            },
            events_rx,
        ))
    }

    /// The peer as first admitted. After a rejoin the current id is in
    /// [`RoomClient::snapshot`].
    pub fn local_peer(&self) -> &Peer {
        &self.local_peer
    }

    /// Queue a message. Messages sent while reconnecting go out on the new
    /// socket after the rejoin.
    pub fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        self.outbound.send(message).map_err(|_| ClientError::Closed)
    }

    pub async fn snapshot(&self) -> RoomStateSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Leave the room and close the socket.
    pub fn leave(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::Leave)
    }

    /// Drop the connection without a goodbye and stop reconnecting.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

async fn dial(url: &str) -> Result<Socket, ClientError> {
    let (socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ClientError::Connection(e.to_string()))?;
    Ok(socket)
}

async fn send(socket: &mut Socket, message: &ClientMessage) -> Result<(), ClientError> {
    let json = serde_json::to_string(message).map_err(|e| ClientError::Connection(e.to_string()))?;
    socket
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| ClientError::Connection(e.to_string()))
}

async fn await_joined(socket: &mut Socket) -> Result<ServerMessage, ClientError> {
    while let Some(frame) = socket.next().await {
        let frame = frame.map_err(|e| ClientError::Connection(e.to_string()))?;
        let WsMessage::Text(text) = frame else {
            continue;
        };
        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(joined @ ServerMessage::Joined { .. }) => return Ok(joined),
            Ok(ServerMessage::Error(e)) => {
                return Err(ClientError::Rejected {
                    code: e.code,
                    message: e.message,
                })
            }
            Ok(other) => debug!(?other, "Ignoring event before room:joined"),
            Err(e) => debug!(error = %e, "Unparseable frame before room:joined"),
        }
    }
    Err(ClientError::Closed)
}

enum Ended {
    /// We left or were told to stop.
    Local,
    RoomClosed(String),
    Dropped(String),
}

struct Driver {
    url: String,
    avatar: Option<String>,
    policy: ReconnectPolicy,
    snapshot: Arc<RwLock<RoomStateSnapshot>>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<ClientEvent>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self, mut socket: Socket) {
        loop {
            match self.pump(&mut socket).await {
                Ended::Local => {
                    let _ = socket.close(None).await;
                    let _ = self.events.send(ClientEvent::Disconnected {
                        reason: "left".into(),
                    });
                    return;
                }
                Ended::RoomClosed(reason) => {
                    let _ = self.events.send(ClientEvent::Disconnected { reason });
                    return;
                }
                Ended::Dropped(reason) => {
                    warn!(reason = %reason, "Relay connection lost");
                    match self.reconnect(reason).await {
                        Some(next) => socket = next,
                        None => return,
                    }
                }
            }
        }
    }

    async fn pump(&mut self, socket: &mut Socket) -> Ended {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ended::Local,
                next = self.outbound.recv() => {
                    let Some(message) = next else { return Ended::Local };
                    let leaving = matches!(message, ClientMessage::Leave);
                    if let Err(e) = send(socket, &message).await {
                        return Ended::Dropped(e.to_string());
                    }
                    if leaving {
                        return Ended::Local;
                    }
                }
                frame = socket.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        let message = match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                debug!(error = %e, "Unparseable relay frame");
                                continue;
                            }
                        };
                        state::apply(&mut *self.snapshot.write().await, &message);
                        let closed = match &message {
                            ServerMessage::RoomClosed { reason } => Some(reason.clone()),
                            _ => None,
                        };
                        let _ = self.events.send(ClientEvent::Message(message));
                        if let Some(reason) = closed {
                            return Ended::RoomClosed(reason);
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by relay".to_string());
                        return Ended::Dropped(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Ended::Dropped(e.to_string()),
                    None => return Ended::Dropped("stream ended".into()),
                }
            }
        }
    }

    /// Redial with backoff. The restore hook queues the rejoin, which is
    /// the first frame on the new socket.
    async fn reconnect(&mut self, cause: String) -> Option<Socket> {
        let (rejoin_tx, mut rejoin_rx) = mpsc::unbounded_channel();
        let progress = self.events.clone();
        let avatar = self.avatar.clone();

        let mut manager = ReconnectionManager::new(ConnectionKind::Signaling, self.policy.clone())
            .on_status(Arc::new(move |status: &ReconnectionStatus| {
                if status.state == ReconnectState::Waiting {
                    let _ = progress.send(ClientEvent::Reconnecting {
                        attempt: status.attempt,
                        max_attempts: status.max_attempts,
                    });
                }
            }))
            .on_restore(Arc::new(move |saved: &RoomStateSnapshot| {
                let _ = rejoin_tx.send(JoinRequest {
                    room_id: saved.room_id.clone(),
                    display_name: saved.display_name.clone(),
                    avatar: avatar.clone(),
                    peer_id: Some(saved.local_peer_id.clone()),
                });
            }));
        manager.save_room_state(self.snapshot.read().await.clone());

        let url = self.url.clone();
        let result = manager
            .start_reconnection(
                |_| {
                    let url = url.clone();
                    async move { dial(&url).await.map_err(|e| e.to_string()) }
                },
                Some(cause),
                &self.cancel,
            )
            .await;

        match result {
            Ok((mut socket, attempt)) => {
                while let Ok(request) = rejoin_rx.try_recv() {
                    info!(room_id = %request.room_id, "Rejoining room");
                    if let Err(e) = send(&mut socket, &ClientMessage::Join(request)).await {
                        warn!(error = %e, "Rejoin failed to send");
                    }
                }
                let _ = self.events.send(ClientEvent::Reconnected { attempt });
                Some(socket)
            }
            Err(ReconnectError::Cancelled) => {
                let _ = self.events.send(ClientEvent::Disconnected {
                    reason: "cancelled".into(),
                });
                None
            }
            Err(e) => {
                warn!(error = %e, "Giving up on relay connection");
                let _ = self.events.send(ClientEvent::Disconnected {
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
