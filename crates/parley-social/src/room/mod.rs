//! Room actors and the registry that routes to them.
//!
//! Each room is one tokio task owning its directory, turn controller,
//! broadcast manager, context and timers. Everything that touches room
//! state arrives as a [`RoomCommand`] on the room's queue, including the
//! completions of its own I/O (upstream link, summarization, timers).

mod actor;
mod registry;
mod settings;
mod source;
mod timers;

use std::sync::Arc;

use parley_ai::{RealtimeConnector, SummarizationService};

pub use actor::{RoomCommand, RoomHandle, RoomReport};
pub use registry::{Registry, RegistryHandle, RegistryStats};
pub use settings::RoomSettings;
pub use source::{RoomSource, StaticRoomSource};
pub use timers::{TimerId, TimerKind, Timers};

/// Collaborators shared by every room on a server.
#[derive(Clone)]
pub struct ServerServices {
    pub connector: Arc<dyn RealtimeConnector>,
    pub summarization: SummarizationService,
    pub source: Arc<dyn RoomSource>,
    pub settings: Arc<RoomSettings>,
}
