//! Bounded exponential backoff for invocation-layer retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for handler re-invocation: a fixed attempt count and an
/// exponential wait with a multiplier, floored at the base delay and capped
/// at the ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Total invocation attempts, first try included.
    pub max_attempts: u32,
    /// Floor on a single retry's wait.
    pub base_delay_ms: u64,
    /// Ceiling on a single retry's wait.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive waits.
    pub multiplier: f64,
    /// Spread each wait by up to `jitter_max_percentage` to decorrelate
    /// concurrent retriers.
    pub jitter_enabled: bool,
    pub jitter_max_percentage: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Wait before retry number `attempt` (1-based: the delay applied after
    /// the `attempt`-th failed try). Clamped to `[base_delay, max_delay]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exponent as i32);
        let clamped = raw.clamp(self.base_delay_ms as f64, self.max_delay_ms as f64);

        let with_jitter = if self.jitter_enabled {
            clamped * (1.0 + self.jitter_fraction())
        } else {
            clamped
        };

        Duration::from_millis(with_jitter.min(self.max_delay_ms as f64) as u64)
    }

    /// Whether another try is allowed after `attempt` completed tries.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    // Cheap sub-millisecond-entropy jitter; good enough to decorrelate
    // retriers without a randomness dependency.
    fn jitter_fraction(&self) -> f64 {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let unit = f64::from(nanos % 1_000) / 1_000.0;
        unit * self.jitter_max_percentage
    }
}
