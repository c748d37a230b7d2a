use std::collections::HashMap;

use async_trait::async_trait;

use crate::types::RoomConfig;

/// Where a room's configuration comes from when it is first joined.
#[async_trait]
pub trait RoomSource: Send + Sync {
    /// Fetch the configuration for `room_id`. Errors are logged by the
    /// caller and the room falls back to defaults.
    async fn fetch(&self, room_id: &str) -> Result<RoomConfig, String>;
}

/// Fixed in-memory configurations; unknown rooms get defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticRoomSource {
    rooms: HashMap<String, RoomConfig>,
}

impl StaticRoomSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_room(mut self, room_id: &str, config: RoomConfig) -> Self {
        self.rooms.insert(room_id.to_string(), config);
        self
    }
}

#[async_trait]
impl RoomSource for StaticRoomSource {
    async fn fetch(&self, room_id: &str) -> Result<RoomConfig, String> {
        Ok(self.rooms.get(room_id).cloned().unwrap_or_default())
    }
}
