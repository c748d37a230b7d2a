//! Configuration schema types for parley.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod ai;
mod broadcast;
mod context;
mod logging;
mod server;

pub use ai::*;
pub use broadcast::*;
pub use context::*;
pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub server: ServerConfig,
    pub rooms: RoomsConfig,
    pub ai: AiConfig,
    pub context: ContextConfig,
    pub summarization: SummarizationConfig,
    pub broadcast: BroadcastConfig,
    pub reconnection: ReconnectionConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_section() {
        let config = ParleyConfig::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.hello_timeout_secs, 10);
    }

    #[test]
    fn default_ai_section() {
        let config = ParleyConfig::default();
        assert_eq!(config.ai.connect_timeout_secs, 10);
        assert_eq!(config.ai.min_transcript_chars, 5);
        assert_eq!(config.ai.context_token_budget, 2000);
    }

    #[test]
    fn default_reconnection_matches_backoff_policy() {
        let config = ParleyConfig::default();
        assert_eq!(config.reconnection.base_delay_ms, 1000);
        assert_eq!(config.reconnection.max_delay_ms, 30000);
        assert!(config.reconnection.exponential);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ParleyConfig = toml::from_str(
            r#"
[rooms]
max_participants = 4
"#,
        )
        .unwrap();
        assert_eq!(config.rooms.max_participants, 4);
        assert_eq!(config.rooms.default_personality, "facilitator");
        assert_eq!(config.context.chars_per_token, 4);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ParleyConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ParleyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.broadcast.sync_offset_ms, 150);
    }
}
