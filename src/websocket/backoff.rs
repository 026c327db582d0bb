//! Reconnect backoff
//!
//! Exponential delay with ±25% jitter, capped at a maximum.

use crate::config::RealtimeConfig;
use std::time::{Duration, SystemTime};

/// Floor for any jittered delay
const MIN_DELAY_MS: u64 = 100;

/// How the channel retries after losing its transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before the channel is declared stale
    pub max_attempts: u32,
    /// Base delay for the first attempt
    pub initial_delay: Duration,
    /// Upper bound before jitter
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RealtimeConfig> for ReconnectPolicy {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            initial_delay: config.initial_backoff,
            max_delay: config.max_backoff,
        }
    }
}

impl ReconnectPolicy {
    /// Undithered delay for a zero-based attempt number
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let base_ms = initial_ms.saturating_mul(2u64.saturating_pow(attempt.min(12)));
        Duration::from_millis(base_ms.min(max_ms))
    }

    /// Jittered delay for a zero-based attempt number
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay(attempt).as_millis() as u64;
        Duration::from_millis(apply_jitter(base_ms, rand_jitter()))
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        attempts <= self.max_attempts
    }
}

fn apply_jitter(base_ms: u64, noise: u64) -> u64 {
    let jitter_range = base_ms / 4;
    if jitter_range == 0 {
        return base_ms.max(MIN_DELAY_MS);
    }
    let offset = (noise % (2 * jitter_range + 1)) as i64 - jitter_range as i64;
    (base_ms as i64 + offset).max(MIN_DELAY_MS as i64) as u64
}

// Clock nanos are enough noise to spread reconnects apart
fn rand_jitter() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64
}
