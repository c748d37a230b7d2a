use std::time::Duration;

use parley_ai::{ContextConfig, SummarizationPolicy};
use parley_config::ParleyConfig;

use crate::broadcast::BroadcastSettings;
use crate::reconnect::ReconnectPolicy;
use crate::turn::TurnSettings;

/// Per-room tuning derived once from the loaded configuration.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub max_participants: u32,
    pub default_personality: String,
    pub context: ContextConfig,
    pub summarization: SummarizationPolicy,
    pub summary_check_interval: Duration,
    pub broadcast: BroadcastSettings,
    pub reconnect: ReconnectPolicy,
    pub turn: TurnSettings,
    pub sample_rate: u32,
    pub context_token_budget: usize,
    pub connect_timeout: Duration,
    pub idle_after: Duration,
    pub room_idle_ttl: Duration,
    pub reaper_interval: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::from(&ParleyConfig::default())
    }
}

impl From<&ParleyConfig> for RoomSettings {
    fn from(config: &ParleyConfig) -> Self {
        let b = &config.broadcast;
        Self {
            max_participants: config.rooms.max_participants,
            default_personality: config.rooms.default_personality.clone(),
            context: ContextConfig {
                max_messages: config.context.max_messages,
                max_tokens_before_summary: config.context.max_tokens_before_summary,
                target_tokens_after_summary: config.context.target_tokens_after_summary,
                chars_per_token: config.context.chars_per_token,
            },
            summarization: SummarizationPolicy {
                enabled: config.summarization.enabled,
                entry_threshold: config.summarization.entry_threshold,
                interval: Duration::from_secs(config.summarization.interval_secs),
            },
            summary_check_interval: Duration::from_secs(config.summarization.check_interval_secs.max(1)),
            broadcast: BroadcastSettings {
                buffer_threshold_ms: u64::from(b.buffer_threshold_ms),
                max_buffer_wait: Duration::from_millis(b.max_buffer_wait_ms),
                sync_offset_ms: b.sync_offset_ms,
                max_buffer_chunks: b.max_buffer_chunks,
                min_ready_fraction: b.min_ready_fraction,
            },
            reconnect: ReconnectPolicy::from(&config.reconnection),
            turn: TurnSettings {
                voice: config.ai.voice.clone(),
                min_transcript_chars: config.ai.min_transcript_chars,
            },
            sample_rate: config.ai.sample_rate,
            context_token_budget: config.ai.context_token_budget,
            connect_timeout: Duration::from_secs(config.ai.connect_timeout_secs),
            idle_after: Duration::from_secs(config.rooms.idle_after_secs),
            room_idle_ttl: Duration::from_secs(config.server.room_idle_ttl_secs),
            reaper_interval: Duration::from_secs(config.server.reaper_interval_secs.max(1)),
        }
    }
}
