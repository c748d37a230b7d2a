//! Full configuration validation.
//!
//! Validates numeric ranges and cross-field constraints, collecting every
//! problem into a single error.

mod helpers;


use helpers::{validate_range, validate_range_f64};

use crate::schema::ParleyConfig;
use parley_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ParleyConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    // Server
    validate_range(&mut errors, "server.port", u64::from(config.server.port), 1, 65535);
    validate_range(&mut errors, "server.hello_timeout_secs", config.server.hello_timeout_secs, 1, 120);
    validate_range(&mut errors, "server.reaper_interval_secs", config.server.reaper_interval_secs, 1, 3600);

    // Rooms
    validate_range(&mut errors, "rooms.max_participants", u64::from(config.rooms.max_participants), 1, 64);
    validate_range(&mut errors, "rooms.idle_after_secs", config.rooms.idle_after_secs, 5, 86400);
    validate_range(&mut errors, "rooms.config_api_timeout_secs", config.rooms.config_api_timeout_secs, 1, 60);

    // AI link
    validate_range(&mut errors, "ai.connect_timeout_secs", config.ai.connect_timeout_secs, 1, 120);
    validate_range(&mut errors, "ai.context_token_budget", config.ai.context_token_budget as u64, 0, 32000);
    validate_range(&mut errors, "ai.sample_rate", u64::from(config.ai.sample_rate), 8000, 48000);

    // Context
    validate_range(&mut errors, "context.max_messages", config.context.max_messages as u64, 1, 10000);
    validate_range(&mut errors, "context.chars_per_token", config.context.chars_per_token as u64, 1, 16);
    if config.context.target_tokens_after_summary >= config.context.max_tokens_before_summary {
        errors.push(format!(
            "context.target_tokens_after_summary ({}) must be below context.max_tokens_before_summary ({})",
            config.context.target_tokens_after_summary, config.context.max_tokens_before_summary
        ));
    }

    // Summarization
    validate_range(&mut errors, "summarization.entry_threshold", config.summarization.entry_threshold as u64, 1, 10000);
    validate_range(&mut errors, "summarization.check_interval_secs", config.summarization.check_interval_secs, 1, 3600);

    // Broadcast
    validate_range(&mut errors, "broadcast.max_buffer_wait_ms", config.broadcast.max_buffer_wait_ms, 0, 10000);
    validate_range(&mut errors, "broadcast.max_buffer_chunks", config.broadcast.max_buffer_chunks as u64, 1, 100000);
    validate_range_f64(&mut errors, "broadcast.min_ready_fraction", config.broadcast.min_ready_fraction, 0.0, 1.0);

    // Reconnection
    validate_range(&mut errors, "reconnection.max_attempts", u64::from(config.reconnection.max_attempts), 1, 100);
    validate_range_f64(&mut errors, "reconnection.jitter", config.reconnection.jitter, 0.0, 1.0);
    if config.reconnection.base_delay_ms > config.reconnection.max_delay_ms {
        errors.push(format!(
            "reconnection.base_delay_ms ({}) exceeds reconnection.max_delay_ms ({})",
            config.reconnection.base_delay_ms, config.reconnection.max_delay_ms
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
