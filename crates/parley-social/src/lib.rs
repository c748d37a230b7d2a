//! Multi-party voice rooms with a shared AI participant.
//!
//! Provides:
//! - Room membership, presence and WebRTC signaling relay
//! - The push-to-talk turn controller driving the upstream AI link
//! - Synchronized response-audio broadcast with late-joiner catch-up
//! - Reconnection with backoff for signaling, peer links and the AI session
//! - One actor per room behind a registry, and a client for the relay

pub mod broadcast;
pub mod client;
pub mod peers;
pub mod protocol;
pub mod reconnect;
pub mod room;
pub mod signaling;
pub mod turn;
pub mod types;

pub use broadcast::{BroadcastAction, BroadcastSettings, ResponseBroadcastManager, ResponseState};
pub use client::{ClientError, ClientEvent, RoomClient, RoomClientConfig};
pub use peers::{PeerDirectory, PeerTx};
pub use protocol::{ClientMessage, ErrorPayload, JoinRequest, ServerMessage};
pub use reconnect::{
    ConnectionKind, PeerReconnections, ReconnectError, ReconnectPolicy, ReconnectionManager,
    RoomStateSnapshot,
};
pub use room::{
    Registry, RegistryHandle, RegistryStats, RoomHandle, RoomSettings, RoomSource,
    ServerServices, StaticRoomSource,
};
pub use signaling::Signal;
pub use turn::{PersonaSettings, Personality, TurnController, TurnEffect};
pub use types::{AiState, AiStateView, Peer, PeerRole, Presence, RoomConfig, RoomInfo, RoomStatus};
