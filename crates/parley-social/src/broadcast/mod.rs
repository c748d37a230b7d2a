//! Buffered, synchronized delivery of AI response audio to every peer in a
//! room, including peers that join while a response is playing.
//!
//! Like the turn controller, the manager performs no I/O. Each call returns
//! [`BroadcastAction`]s for the room to execute: messages to peers and
//! requests to arm or disarm the buffering wait timer.

mod manager;

pub use manager::{
    BroadcastAction, BroadcastAudioChunk, BroadcastSettings, PeerSubscription,
    ResponseBroadcastManager, ResponseInfo, ResponseState,
};
