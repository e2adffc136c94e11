//! Circuit breaker around the content generator.
//!
//! - Closed: calls pass; `failure_threshold` consecutive failures open it.
//! - Open: calls are refused until `reset_timeout` has passed since opening.
//! - HalfOpen: one trial call goes through. Success closes, failure re-opens.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ports::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// May a call go through now? Moves Open -> HalfOpen once the reset timeout passed.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let reset = chrono::Duration::from_std(self.reset_timeout)
                    .unwrap_or(chrono::Duration::MAX);
                let elapsed = inner
                    .opened_at
                    .map(|at| self.clock.now() - at)
                    .unwrap_or(chrono::Duration::MAX);
                if elapsed >= reset {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!(breaker = %self.name, "circuit breaker half-open, probing");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let trip = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if trip && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(self.clock.now());
            tracing::warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
        }
    }
}
