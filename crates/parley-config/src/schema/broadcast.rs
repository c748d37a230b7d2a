//! Response-audio broadcast and reconnection configuration.

use serde::{Deserialize, Serialize};

/// Buffering thresholds for synchronized AI audio delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub buffer_threshold_ms: u32,
    pub max_buffer_wait_ms: u64,
    pub sync_offset_ms: u64,
    pub max_buffer_chunks: usize,
    /// Fraction of peers (0.0-1.0) that must report ready before broadcast starts early.
    pub min_ready_fraction: f64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            buffer_threshold_ms: 200,
            max_buffer_wait_ms: 500,
            sync_offset_ms: 150,
            max_buffer_chunks: 1024,
            min_ready_fraction: 0.5,
        }
    }
}

/// Backoff policy shared by every reconnecting link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential: bool,
    pub jitter: f64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            exponential: true,
            jitter: 0.3,
        }
    }
}
