//! Backoff policy for re-establishing a lost push stream.
//!
//! The default is a fixed delay of [`DEFAULT_RECONNECT_DELAY`] between a
//! non-graceful closure and the next connection attempt. Setting a
//! `multiplier` above `1.0` turns it into exponential backoff clamped at
//! `max_delay`.

use std::time::Duration;

/// Delay before reconnecting after an unexpected closure.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Tunable parameters for the reconnection backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failed attempt.
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// A constant delay between every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Calculate the delay that follows `current`.
    ///
    /// The result is clamped to [`max_delay`](Self::max_delay) and never
    /// drops below [`initial_delay`](Self::initial_delay).
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier.max(1.0)) as u64;
        Duration::from_millis(next_ms)
            .max(self.initial_delay)
            .min(self.max_delay.max(self.initial_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}
