//! Circuit breaker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by every breaker a registry creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Base time an open circuit waits before allowing a half-open trial.
    pub cooldown: Duration,
    /// Cooldown multiplier applied on every failed half-open trial.
    pub cooldown_backoff: f64,
    /// Upper bound the backoff can never exceed.
    pub max_cooldown: Duration,
    /// Random jitter added on re-open, so sibling adapters against the same
    /// upstream do not retry in lockstep.
    pub jitter: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            cooldown_backoff: 2.0,
            max_cooldown: Duration::from_secs(300),
            jitter: Duration::from_millis(500),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_cooldown_backoff(mut self, multiplier: f64) -> Self {
        self.cooldown_backoff = multiplier.max(1.0);
        self
    }

    pub fn with_max_cooldown(mut self, max: Duration) -> Self {
        self.max_cooldown = max;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Opens quickly and recovers quickly. Suits cheap upstreams where a
    /// wasted trial call costs little.
    pub fn strict() -> Self {
        Self {
            failure_threshold: 2,
            cooldown: Duration::from_secs(10),
            ..Default::default()
        }
    }

    /// Tolerates long failure runs before opening. Suits upstreams with
    /// known-flaky networking where failures are usually transient.
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            cooldown: Duration::from_secs(60),
            ..Default::default()
        }
    }
}
