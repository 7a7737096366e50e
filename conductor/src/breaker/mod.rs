//! Circuit breakers for external calls.
//!
//! Small per-breaker state machine behind a single lock. Transitions:
//! CLOSED → OPEN when `fail_counter` reaches `fail_max`; OPEN → HALF_OPEN
//! after `reset_timeout`; HALF_OPEN → CLOSED on the next success, → OPEN on
//! the next failure. State changes are logged and success/failure counts are
//! exposed in snapshots.
//!
//! The manager keeps a process-wide map keyed by breaker name; tests use
//! `reset_all()` as a lifecycle boundary.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Breaker state as exposed on snapshots and tool records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    fail_counter: u32,
    opened_at: Option<Instant>,
    successes: u64,
    failures: u64,
}

/// One named circuit breaker.
///
/// **Interaction**: obtained from the `CircuitBreakerManager`; consulted by
/// `McpIntegrationService::run_tool` before and during every tool call.
pub struct CircuitBreaker {
    name: String,
    fail_max: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

/// Point-in-time view of one breaker, for status endpoints and metrics.
#[derive(Clone, Debug, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub fail_counter: u32,
    pub fail_max: u32,
    pub reset_timeout_secs: u64,
    pub successes: u64,
    pub failures: u64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, fail_max: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            fail_max: fail_max.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                fail_counter: 0,
                opened_at: None,
                successes: 0,
                failures: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        if inner.state != to {
            tracing::warn!(
                breaker = %self.name,
                from = inner.state.as_str(),
                to = to.as_str(),
                "circuit breaker state changed"
            );
            inner.state = to;
        }
    }

    /// Current state, applying the OPEN → HALF_OPEN time transition.
    pub fn current_state(&self) -> CircuitState {
        let mut inner = self.lock();
        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.reset_timeout {
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }
        inner.state
    }

    pub fn fail_counter(&self) -> u32 {
        self.lock().fail_counter
    }

    /// Records a successful call. Closes a half-open breaker.
    pub fn success(&self) {
        let mut inner = self.lock();
        inner.successes += 1;
        inner.fail_counter = 0;
        if inner.state != CircuitState::Closed {
            inner.opened_at = None;
            self.transition(&mut inner, CircuitState::Closed);
        }
        tracing::debug!(breaker = %self.name, "circuit breaker recorded success");
    }

    /// Records a failed call. Opens at exactly the `fail_max`-th consecutive
    /// failure; a half-open breaker re-opens immediately.
    pub fn failure(&self, error: &str) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.fail_counter += 1;
        tracing::error!(breaker = %self.name, %error, "circuit breaker recorded failure");
        let should_open = inner.state == CircuitState::HalfOpen || inner.fail_counter >= self.fail_max;
        if should_open && inner.state != CircuitState::Open {
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    /// Forces the breaker back to CLOSED, clearing the failure count.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.fail_counter = 0;
        inner.opened_at = None;
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.current_state();
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state,
            fail_counter: inner.fail_counter,
            fail_max: self.fail_max,
            reset_timeout_secs: self.reset_timeout.as_secs(),
            successes: inner.successes,
            failures: inner.failures,
        }
    }
}

/// Process-wide registry of breakers keyed by name.
#[derive(Default)]
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named breaker, creating it with the given policy when
    /// absent. Policy of an existing breaker is not changed.
    pub fn get_breaker(
        &self,
        name: &str,
        fail_max: u32,
        reset_timeout: Duration,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        let breaker = Arc::new(CircuitBreaker::new(name, fail_max, reset_timeout));
        tracing::info!(
            breaker = name,
            fail_max,
            reset_timeout_secs = reset_timeout.as_secs(),
            "circuit breaker created"
        );
        self.breakers
            .entry(name.to_string())
            .or_insert(breaker)
            .value()
            .clone()
    }

    /// Snapshot of one breaker, or None when unknown.
    pub fn status(&self, name: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(name).map(|b| b.snapshot())
    }

    /// Snapshots of every registered breaker.
    pub fn status_all(&self) -> Vec<BreakerSnapshot> {
        let mut out: Vec<BreakerSnapshot> =
            self.breakers.iter().map(|e| e.value().snapshot()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Forces one breaker closed. Returns false when unknown.
    pub fn reset(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(b) => {
                b.reset();
                tracing::info!(breaker = name, "circuit breaker manually reset");
                true
            }
            None => false,
        }
    }

    /// Drops every breaker. Test lifecycle only.
    pub fn reset_all(&self) {
        self.breakers.clear();
    }
}

static MANAGER: Lazy<Arc<CircuitBreakerManager>> =
    Lazy::new(|| Arc::new(CircuitBreakerManager::new()));

/// The process-wide breaker manager.
pub fn circuit_breaker_manager() -> Arc<CircuitBreakerManager> {
    MANAGER.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: breaker opens at exactly the fail_max-th consecutive
    /// failure, not before.
    #[test]
    fn opens_exactly_at_fail_max() {
        let b = CircuitBreaker::new("t1", 3, Duration::from_secs(30));
        b.failure("boom");
        b.failure("boom");
        assert_eq!(b.current_state(), CircuitState::Closed);
        b.failure("boom");
        assert_eq!(b.current_state(), CircuitState::Open);
        assert_eq!(b.fail_counter(), 3);
    }

    /// **Scenario**: a success resets the consecutive failure count, so
    /// non-consecutive failures never open the breaker.
    #[test]
    fn success_resets_failure_streak() {
        let b = CircuitBreaker::new("t2", 2, Duration::from_secs(30));
        b.failure("boom");
        b.success();
        b.failure("boom");
        assert_eq!(b.current_state(), CircuitState::Closed);
    }

    /// **Scenario**: after reset_timeout the breaker probes half-open; the
    /// next success closes it, the next failure re-opens it.
    #[test]
    fn half_open_probing() {
        let b = CircuitBreaker::new("t3", 1, Duration::from_millis(20));
        b.failure("boom");
        assert_eq!(b.current_state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(b.current_state(), CircuitState::HalfOpen);
        b.failure("boom again");
        assert_eq!(b.current_state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(b.current_state(), CircuitState::HalfOpen);
        b.success();
        assert_eq!(b.current_state(), CircuitState::Closed);
    }

    /// **Scenario**: manager returns the same breaker for the same name and
    /// reports snapshots with call counts.
    #[test]
    fn manager_reuses_named_breakers() {
        let m = CircuitBreakerManager::new();
        let a = m.get_breaker("svc", 3, Duration::from_secs(30));
        let b = m.get_breaker("svc", 99, Duration::from_secs(1));
        assert!(Arc::ptr_eq(&a, &b));
        a.success();
        a.failure("x");
        let snap = m.status("svc").unwrap();
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.fail_max, 3);
        assert!(m.reset("svc"));
        assert!(!m.reset("missing"));
    }
}
