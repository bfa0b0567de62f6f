//! Circuit breaker state machine
//!
//! Three states, evaluated lazily (no background timer):
//! - Closed: calls permitted; consecutive failures counted
//! - Open: calls refused until the cooldown has elapsed
//! - HalfOpen: exactly one trial call permitted
//!
//! Every mutation happens under one short-held mutex so concurrent callers
//! reporting outcomes for the same adapter cannot lose updates. The lock is
//! never held across a network call; the dispatch loop acquires a permit,
//! releases the lock, performs the call, then reports the outcome.

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::config::CircuitBreakerConfig;
use super::metrics::{BreakerMetricsSnapshot, CircuitBreakerMetrics};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Cooldown currently in force; grows on failed half-open trials.
    current_cooldown: Duration,
    /// Whether the single half-open trial permit is taken.
    trial_in_flight: bool,
}

/// Per-adapter failure-gating state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    metrics: Arc<CircuitBreakerMetrics>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let current_cooldown = config.cooldown;
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                current_cooldown,
                trial_in_flight: false,
            }),
            metrics: Arc::new(CircuitBreakerMetrics::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying the lazy Open -> HalfOpen transition when the
    /// cooldown has elapsed.
    pub fn state(&self) -> State {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Ask for permission to attempt a call.
    ///
    /// Granting the HalfOpen trial permit is atomic with the state check, so
    /// two concurrent callers cannot both take it.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        match inner.state {
            State::Closed => true,
            State::Open => {
                self.metrics.record_rejected();
                false
            }
            State::HalfOpen => {
                if inner.trial_in_flight {
                    self.metrics.record_rejected();
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures = 0;
            }
            State::HalfOpen => {
                inner.state = State::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.current_cooldown = self.config.cooldown;
                inner.trial_in_flight = false;
                self.metrics.record_closed();
                info!(breaker = %self.name, "circuit closed after successful trial");
            }
            // A call that started before the circuit opened finished late.
            State::Open => {}
        }
        self.metrics.record_success();
    }

    /// Report a failed call (invoke or probe alike).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.current_cooldown = self.config.cooldown;
                    self.metrics.record_opened();
                    info!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        cooldown_ms = inner.current_cooldown.as_millis() as u64,
                        "circuit opened"
                    );
                }
            }
            State::HalfOpen => {
                inner.trial_in_flight = false;
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.current_cooldown = self.next_cooldown(inner.current_cooldown);
                self.metrics.record_opened();
                info!(
                    breaker = %self.name,
                    cooldown_ms = inner.current_cooldown.as_millis() as u64,
                    "trial failed, circuit re-opened"
                );
            }
            // Late failure from a call that predates the open transition.
            State::Open => {}
        }
        self.metrics.record_failure();
    }

    pub fn metrics(&self) -> &Arc<CircuitBreakerMetrics> {
        &self.metrics
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state();
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state,
            consecutive_failures: inner.consecutive_failures,
            metrics: self.metrics.snapshot(),
        }
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state == State::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= inner.current_cooldown
        {
            inner.state = State::HalfOpen;
            inner.trial_in_flight = false;
            self.metrics.record_half_open();
            debug!(breaker = %self.name, "cooldown elapsed, circuit half-open");
        }
    }

    /// Scaled cooldown for a re-open, capped, with a little jitter.
    fn next_cooldown(&self, current: Duration) -> Duration {
        let scaled = current
            .mul_f64(self.config.cooldown_backoff)
            .min(self.config.max_cooldown);
        if self.config.jitter.is_zero() {
            scaled
        } else {
            scaled + self.config.jitter.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
        }
    }
}

/// Point-in-time view of one breaker, for health introspection.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: State,
    pub consecutive_failures: u32,
    pub metrics: BreakerMetricsSnapshot,
}
