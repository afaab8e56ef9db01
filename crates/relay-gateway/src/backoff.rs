//! Reconnect backoff policy
//!
//! Exponential delay with jitter, capped at a maximum. The attempt counter
//! resets to zero on any successful handshake.

use rand::Rng;
use relay_common::BackoffConfig;
use std::time::Duration;

/// Reconnect policy state: attempt counter plus computed delay.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a fresh policy
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempts: 0 }
    }

    /// Number of consecutive failed attempts
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and compute the delay before the next one.
    ///
    /// `delay = min(base * multiplier^(attempts-1), max) * (1 ± jitter)`
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);

        let exp = self.config.base_ms as f64 * self.config.multiplier.powi(self.attempts as i32 - 1);
        let capped = exp.min(self.config.max_ms as f64);

        let span = capped * self.config.jitter;
        let jittered = capped - span + rand::thread_rng().gen::<f64>() * 2.0 * span;

        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Reset after a successful handshake
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
