use crate::clock::{system_clock, Clock};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker position. `Closed` is the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Every check proceeds to health evaluation.
    Closed,
    /// Checks are rejected without evaluating health.
    Open,
    /// One trial evaluation decides whether to close again.
    HalfOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub consecutive_failures: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive unhealthy evaluations that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open after the last failure.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold (at least 1)
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the open timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    /// Set while the half-open trial is being evaluated.
    trial_started: Option<Instant>,
}

/// Three-state circuit breaker guarding the health evaluation.
///
/// - Counts consecutive unhealthy evaluations
/// - Opens once the count reaches the threshold
/// - After `timeout` without failures, lets exactly one trial through
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self::with_clock(cfg, system_clock())
    }

    pub fn with_clock(cfg: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg: CircuitBreakerConfig {
                failure_threshold: cfg.failure_threshold.max(1),
                timeout: cfg.timeout,
            },
            clock,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trial_started: None,
            }),
        }
    }

    // A poisoned lock still holds a consistent State; every update below is a
    // handful of plain assignments.
    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(st) => st,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns `true` when the caller must skip health evaluation.
    ///
    /// Consulting an open breaker whose timeout has elapsed moves it to
    /// half-open and admits the caller as the trial.
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let expired = st
                    .last_failure
                    .map_or(true, |at| now.saturating_duration_since(at) > self.cfg.timeout);
                if expired {
                    st.state = CircuitState::HalfOpen;
                    st.trial_started = Some(now);
                    info!("circuit breaker half-open, admitting trial evaluation");
                    false
                } else {
                    true
                }
            }
            CircuitState::HalfOpen => {
                // A trial that never reported back (dropped future) must not
                // wedge the breaker; hand out a fresh trial after `timeout`.
                let stale = st
                    .trial_started
                    .map_or(true, |at| now.saturating_duration_since(at) > self.cfg.timeout);
                if stale {
                    st.trial_started = Some(now);
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Feed the result of a health evaluation.
    pub fn record_outcome(&self, success: bool) {
        let now = self.clock.now();
        let mut st = self.lock();
        st.trial_started = None;

        if success {
            if st.state != CircuitState::Closed {
                info!(previous = ?st.state, "circuit breaker closed");
            }
            st.state = CircuitState::Closed;
            st.consecutive_failures = 0;
            return;
        }

        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        st.last_failure = Some(now);
        let trip = match st.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => st.consecutive_failures >= self.cfg.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            warn!(
                consecutive_failures = st.consecutive_failures,
                timeout_ms = millis(self.cfg.timeout),
                "circuit breaker opened"
            );
            st.state = CircuitState::Open;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = self.clock.now();
        let st = self.lock();
        let open_remaining_ms = match (st.state, st.last_failure) {
            (CircuitState::Open, Some(at)) => match at.checked_add(self.cfg.timeout) {
                Some(until) => (until > now).then(|| millis(until - now)),
                // timeout past the end of representable time: never closes
                None => Some(u64::MAX),
            },
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            timeout_ms: millis(self.cfg.timeout),
            consecutive_failures: st.consecutive_failures,
            open_remaining_ms,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
