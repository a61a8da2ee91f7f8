//! Per-server circuit breaker.
//!
//! The breaker is the backpressure mechanism that stops Vigil from
//! hammering a failing capability server: once consecutive failures
//! reach the threshold the circuit opens and every call fails fast with
//! no network attempt until the recovery timeout elapses. A limited
//! probe budget is then allowed through in half-open state; one probe
//! failure reopens the circuit, a configured run of probe successes
//! closes it again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before probing, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// Calls allowed through while half-open.
    pub half_open_max_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_ms: 30_000,
            success_threshold: 2,
            half_open_max_probes: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    probes_in_flight: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker guarding one capability server.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                probes_in_flight: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Ask permission to issue one call.
    ///
    /// Returns `false` when the circuit is open (and the recovery
    /// timeout has not elapsed) or the half-open probe budget is spent.
    /// A `true` from half-open state consumes one probe.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= Duration::from_millis(self.config.recovery_timeout_ms) {
                    debug!("circuit recovery timeout elapsed, entering half-open");
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.probes_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probes_in_flight < self.config.half_open_max_probes {
                    inner.probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    debug!("circuit closed after successful probes");
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.probes_in_flight = 0;
                }
            }
            // A success racing the open transition changes nothing.
            BreakerState::Open => {}
        }
    }

    /// Record a failed call (network error or timeout).
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        "failure threshold reached, circuit open"
                    );
                    inner.state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => {
                warn!("probe failed while half-open, circuit reopened");
                inner.state = BreakerState::Open;
                inner.half_open_successes = 0;
                inner.probes_in_flight = 0;
            }
            BreakerState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            recovery_timeout_ms: recovery_ms,
            success_threshold: 2,
            half_open_max_probes: 2,
        })
    }

    #[test]
    fn opens_after_threshold_failures() {
        let b = breaker(60_000);
        assert_eq!(b.state(), BreakerState::Closed);
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Closed);
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire());
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let b = breaker(60_000);
        b.on_failure();
        b.on_failure();
        b.on_success();
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn recovery_timeout_allows_probes() {
        let b = breaker(0);
        for _ in 0..3 {
            b.on_failure();
        }
        assert_eq!(b.state(), BreakerState::Open);

        // Zero timeout: first acquire flips to half-open and consumes
        // one probe; budget of 2 allows exactly one more.
        assert!(b.try_acquire());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(b.try_acquire());
        assert!(!b.try_acquire());
    }

    #[test]
    fn half_open_failure_reopens() {
        let b = breaker(0);
        for _ in 0..3 {
            b.on_failure();
        }
        assert!(b.try_acquire());
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_successes_close_the_circuit() {
        let b = breaker(0);
        for _ in 0..3 {
            b.on_failure();
        }
        assert!(b.try_acquire());
        b.on_success();
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(b.try_acquire());
        b.on_success();
        assert_eq!(b.state(), BreakerState::Closed);

        // Failure counter was reset on close.
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
