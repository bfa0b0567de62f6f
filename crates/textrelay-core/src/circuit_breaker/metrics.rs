//! Circuit breaker metrics
//!
//! Lock-free counters fed by the state machine, snapshotted for the relay's
//! health introspection surface.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Default)]
pub struct CircuitBreakerMetrics {
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    /// Calls refused because the circuit was open.
    total_rejected: AtomicU64,
    total_transitions: AtomicU64,
    last_opened_at_ms: AtomicU64,
    last_closed_at_ms: AtomicU64,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_opened(&self) {
        self.total_transitions.fetch_add(1, Ordering::Relaxed);
        self.last_opened_at_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_closed(&self) {
        self.total_transitions.fetch_add(1, Ordering::Relaxed);
        self.last_closed_at_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_half_open(&self) {
        self.total_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BreakerMetricsSnapshot {
        BreakerMetricsSnapshot {
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_transitions: self.total_transitions.load(Ordering::Relaxed),
            last_opened_at_ms: self.last_opened_at_ms.load(Ordering::Relaxed),
            last_closed_at_ms: self.last_closed_at_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a breaker's counters.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerMetricsSnapshot {
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
    pub total_transitions: u64,
    pub last_opened_at_ms: u64,
    pub last_closed_at_ms: u64,
}
