use std::time::Duration;

use parley_config::schema::ReconnectionConfig;
use rand::Rng;

/// Error substrings for which retrying can never help.
pub const NON_RECOVERABLE_KEYWORDS: &[&str] = &[
    "banned",
    "unauthorized",
    "kicked",
    "room_not_found",
    "room_closed",
    "invalid_token",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Doubling per attempt when true, linear growth otherwise.
    pub exponential: bool,
    /// Fraction of the delay randomly added or removed, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectionConfig::default())
    }
}

impl From<&ReconnectionConfig> for ReconnectPolicy {
    fn from(config: &ReconnectionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential: config.exponential,
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Delay before attempt `attempt` (1-based).
///
/// `min(base * 2^(n-1), max)` or `min(base * n, max)`, then scaled by a
/// random factor in `1 ± jitter`.
pub fn calculate_reconnection_delay(attempt: u32, policy: &ReconnectPolicy) -> Duration {
    let n = attempt.max(1);
    let base = policy.base_delay.as_millis() as u64;
    let raw = if policy.exponential {
        let factor = 1u64.checked_shl(n - 1).unwrap_or(u64::MAX);
        base.saturating_mul(factor)
    } else {
        base.saturating_mul(u64::from(n))
    };
    let capped = raw.min(policy.max_delay.as_millis() as u64);

    if policy.jitter <= 0.0 {
        return Duration::from_millis(capped);
    }
    let spread = rand::thread_rng().gen_range(-policy.jitter..=policy.jitter);
    let jittered = (capped as f64 * (1.0 + spread)).max(0.0);
    Duration::from_millis(jittered.round() as u64)
}

pub fn is_recoverable_error(error: &str) -> bool {
    let lower = error.to_ascii_lowercase();
    !NON_RECOVERABLE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Whether another attempt should follow `attempts` failed ones.
pub fn should_reconnect(attempts: u32, max_attempts: u32, last_error: Option<&str>) -> bool {
    if last_error.is_some_and(|e| !is_recoverable_error(e)) {
        return false;
    }
    attempts < max_attempts
}
