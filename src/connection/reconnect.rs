//! Reconnect backoff policy.

use backoff::{ExponentialBackoff, backoff::Backoff};
use std::time::Duration;

use crate::config::ReconnectSettings;

/// Tracks reconnect attempts and yields `min(base * 2^attempt, max)` delays.
///
/// Delays are deterministic (no jitter) and whole milliseconds.
#[derive(Debug)]
pub struct ReconnectPolicy {
    settings: ReconnectSettings,
    attempt: u32,
    backoff: ExponentialBackoff,
}

impl ReconnectPolicy {
    pub fn new(settings: ReconnectSettings) -> Self {
        let base = Duration::from_millis(settings.base_delay_ms);
        let backoff = ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_millis(settings.max_delay_ms),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        Self {
            settings,
            attempt: 0,
            backoff,
        }
    }

    /// Retries scheduled since the connection was last open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.settings.max_attempts
    }

    /// Delay before the next retry, or `None` once `max_attempts` retries were scheduled.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.backoff.max_interval);
        self.attempt += 1;

        // The backoff crate may add sub-nanosecond noise even with zero randomization
        Some(Duration::from_millis(
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        ))
    }

    /// Called whenever the connection reaches Open, or a fresh `connect()` starts.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.backoff.reset();
    }
}
