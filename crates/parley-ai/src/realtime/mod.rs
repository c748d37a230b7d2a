//! Upstream realtime voice-AI protocol and transport.

pub mod link;
pub mod protocol;

pub use link::{LinkEvent, LinkPeer, LinkSender, RealtimeConnector, RealtimeLink, WsRealtimeConnector};
pub use protocol::{
    ConversationItem, ErrorDetail, RealtimeClientEvent, RealtimeServerEvent, ResponseOptions,
    ResponseRef, SessionConfig,
};
