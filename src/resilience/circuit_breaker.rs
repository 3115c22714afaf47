//! Count-based circuit breaker.
//!
//! ```text
//!            failure rate > threshold
//!   CLOSED ───────────────────────────▶ OPEN
//!     ▲                                  │ wait_duration_in_open_state
//!     │ all trial calls succeed          ▼
//!     └──────────────────────────── HALF_OPEN ──▶ OPEN (any trial fails)
//! ```
//!
//! Transitions happen under a single mutex. The current state is mirrored in
//! an atomic so [`CircuitBreaker::state`] never takes the lock. Outcomes from
//! permits issued before the latest transition are discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use tokio::time::Instant;

/// Default failure rate threshold in percent.
pub const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 50.0;
/// Default number of outcomes kept in the sliding window.
pub const DEFAULT_SLIDING_WINDOW_SIZE: usize = 100;
/// Default number of outcomes required before the rate is evaluated.
pub const DEFAULT_MINIMUM_NUMBER_OF_CALLS: usize = 10;
/// Default cool-down before trial calls are let through.
pub const DEFAULT_WAIT_DURATION_IN_OPEN_STATE: Duration = Duration::from_secs(60);
/// Default number of trial calls in the half-open state.
pub const DEFAULT_PERMITTED_CALLS_IN_HALF_OPEN_STATE: usize = 10;

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure rate in percent; the circuit opens when the observed rate exceeds it.
    pub failure_rate_threshold: f64,
    /// Number of most recent outcomes considered.
    pub sliding_window_size: usize,
    /// Outcomes required in the window before the rate is evaluated.
    pub minimum_number_of_calls: usize,
    /// Cool-down spent in OPEN before probing.
    #[serde(with = "humantime_serde")]
    pub wait_duration_in_open_state: Duration,
    /// Trial calls allowed in HALF_OPEN.
    pub permitted_calls_in_half_open_state: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
            sliding_window_size: DEFAULT_SLIDING_WINDOW_SIZE,
            minimum_number_of_calls: DEFAULT_MINIMUM_NUMBER_OF_CALLS,
            wait_duration_in_open_state: DEFAULT_WAIT_DURATION_IN_OPEN_STATE,
            permitted_calls_in_half_open_state: DEFAULT_PERMITTED_CALLS_IN_HALF_OPEN_STATE,
        }
    }
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Proof that a call was admitted. Hand it back with the outcome.
///
/// A permit dropped without an outcome (the caller's future was cancelled)
/// returns its HALF_OPEN trial slot to the breaker.
#[derive(Debug)]
#[must_use = "record the call outcome with on_success/on_failure"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    recorded: bool,
}

impl CallPermit<'_> {
    fn take(mut self) -> u64 {
        self.recorded = true;
        self.generation
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.abandon(self.generation);
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed {
        window: VecDeque<bool>,
        failures: usize,
    },
    Open {
        since: Instant,
    },
    HalfOpen {
        issued: usize,
        succeeded: usize,
    },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    generation: u64,
}

/// Thread-safe circuit breaker shared by all callers of one operation family.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    state: AtomicU8,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                phase: closed_phase(config.sliding_window_size),
                generation: 0,
            }),
            config,
            state: AtomicU8::new(CircuitState::Closed.as_u8()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state without locking. May lag a pending OPEN → HALF_OPEN move.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Ask to perform a call. `None` means short-circuit to the fallback.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        let permit = |generation| CallPermit {
            breaker: self,
            generation,
            recorded: false,
        };

        match &mut inner.phase {
            Phase::Closed { .. } => Some(permit(generation)),
            Phase::Open { since } => {
                if since.elapsed() < self.config.wait_duration_in_open_state {
                    return None;
                }
                self.transition(
                    &mut inner,
                    Phase::HalfOpen {
                        issued: 1,
                        succeeded: 0,
                    },
                );
                Some(permit(inner.generation))
            }
            Phase::HalfOpen { issued, .. } => {
                if *issued >= self.config.permitted_calls_in_half_open_state {
                    return None;
                }
                *issued += 1;
                Some(permit(generation))
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&self, permit: CallPermit<'_>) {
        self.record(permit.take(), true);
    }

    /// Record a failed call (after retries were exhausted).
    pub fn on_failure(&self, permit: CallPermit<'_>) {
        self.record(permit.take(), false);
    }

    /// A permit went away without an outcome. Free its trial slot.
    fn abandon(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if generation != inner.generation {
            return;
        }
        if let Phase::HalfOpen { issued, .. } = &mut inner.phase {
            *issued = issued.saturating_sub(1);
            tracing::debug!(breaker = %self.name, "Trial call abandoned, slot released");
        }
    }

    fn record(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        if generation != inner.generation {
            return;
        }

        let next = match &mut inner.phase {
            Phase::Closed { window, failures } => {
                window.push_back(success);
                if !success {
                    *failures += 1;
                }
                if window.len() > self.config.sliding_window_size
                    && window.pop_front() == Some(false)
                {
                    *failures -= 1;
                }

                if window.len() >= self.config.minimum_number_of_calls {
                    let rate = *failures as f64 * 100.0 / window.len() as f64;
                    (rate > self.config.failure_rate_threshold).then(|| {
                        tracing::warn!(
                            breaker = %self.name,
                            failure_rate = rate,
                            threshold = self.config.failure_rate_threshold,
                            "Failure rate above threshold, opening circuit"
                        );
                        Phase::Open {
                            since: Instant::now(),
                        }
                    })
                } else {
                    None
                }
            }
            // Outcome of a permit issued just before the circuit opened.
            Phase::Open { .. } => None,
            Phase::HalfOpen { succeeded, .. } => {
                if !success {
                    tracing::warn!(breaker = %self.name, "Trial call failed, reopening circuit");
                    Some(Phase::Open {
                        since: Instant::now(),
                    })
                } else {
                    *succeeded += 1;
                    (*succeeded >= self.config.permitted_calls_in_half_open_state).then(|| {
                        tracing::info!(breaker = %self.name, "Trial calls succeeded, closing circuit");
                        closed_phase(self.config.sliding_window_size)
                    })
                }
            }
        };

        if let Some(phase) = next {
            self.transition(&mut inner, phase);
        }
    }

    fn transition(&self, inner: &mut Inner, phase: Phase) {
        let from = phase_state(&inner.phase);
        let to = phase_state(&phase);
        inner.phase = phase;
        inner.generation += 1;
        self.state.store(to.as_u8(), Ordering::Release);
        tracing::debug!(breaker = %self.name, %from, %to, "Circuit state transition");
    }
}

fn closed_phase(window_size: usize) -> Phase {
    Phase::Closed {
        window: VecDeque::with_capacity(window_size.min(1024) + 1),
        failures: 0,
    }
}

fn phase_state(phase: &Phase) -> CircuitState {
    match phase {
        Phase::Closed { .. } => CircuitState::Closed,
        Phase::Open { .. } => CircuitState::Open,
        Phase::HalfOpen { .. } => CircuitState::HalfOpen,
    }
}
