// Copyright 2025 Cowboy AI, LLC.

//! Per-engine circuit breaker
//!
//! Closed until N consecutive failures, then Open for a cooldown, then
//! HalfOpen for one probe. While Open, callers short-circuit without
//! touching the engine.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests short-circuit
    Open,
    /// One probe request is allowed through
    HalfOpen,
}

/// Breaker tuning, configurable per engine
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_error: Option<String>,
}

/// Per-engine, per-process circuit breaker
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                last_error: None,
            }),
        }
    }

    /// Whether a request may go out right now
    ///
    /// Transitions Open to HalfOpen once the cooldown has elapsed; the
    /// HalfOpen probe is the caller's request.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |opened| opened.elapsed());
                if elapsed >= self.config.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call: the circuit closes
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.last_error = None;
    }

    /// Record a failed call; opens the circuit at the threshold
    pub fn record_failure(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.last_error = Some(error.to_string());
        match inner.state {
            // A failed probe re-opens immediately.
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Force the circuit open (rate-limit exhaustion)
    pub fn trip(&self, reason: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.last_error = Some(reason.to_string());
    }

    /// Current state without side effects
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Most recent recorded error
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_error
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 60_000);
        assert!(cb.allow());
        cb.record_failure("boom");
        cb.record_failure("boom");
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure("boom");
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
        assert_eq!(cb.last_error().as_deref(), Some("boom"));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, 60_000);
        cb.record_failure("boom");
        cb.record_failure("boom");
        cb.record_success();
        cb.record_failure("boom");
        cb.record_failure("boom");
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_closes_on_success() {
        let cb = breaker(1, 0);
        cb.record_failure("boom");
        assert_eq!(cb.state(), CircuitState::Open);

        // Cooldown of zero: the next allow() flips to HalfOpen.
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_reopens_on_failure() {
        let cb = breaker(1, 0);
        cb.record_failure("boom");
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure("still down");
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_trip_forces_open() {
        let cb = breaker(100, 60_000);
        cb.trip("daily quota exhausted");
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }
}
