//! Relay server and room-lifecycle configuration types.

use serde::{Deserialize, Serialize};

/// Listener and connection-handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Seconds a new connection has to send `room:join`.
    pub hello_timeout_secs: u64,
    /// Seconds an empty room stays registered before it is reaped.
    pub room_idle_ttl_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8787,
            hello_timeout_secs: 10,
            room_idle_ttl_secs: 300,
            reaper_interval_secs: 60,
        }
    }
}

/// Defaults applied to rooms that the room-config API does not describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub max_participants: u32,
    /// Base URL of the collaborator serving `GET /api/rooms/:id`. Empty disables lookups.
    pub config_api_url: String,
    /// Request timeout for room-config lookups.
    pub config_api_timeout_secs: u64,
    pub default_personality: String,
    /// Seconds without a heartbeat before a peer is flagged idle.
    pub idle_after_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            max_participants: 8,
            config_api_url: String::new(),
            config_api_timeout_secs: 5,
            default_personality: "facilitator".into(),
            idle_after_secs: 60,
        }
    }
}
