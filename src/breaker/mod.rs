//! # Circuit Breaker
//!
//! Guards calls to a fault-prone dependency (in this crate, remote actor proxies).
//!
//! ```text
//! CLOSED ──failures in window──> HALF_OPEN ──any failure──> OPEN
//!   ^                              │    ^                      │
//!   └──── success_count_to_close ──┘    └── keep_open elapsed ─┘
//! ```
//!
//! - **Closed**: calls pass; failure instants are tracked in a sliding window. Reaching
//!   `failure_count_to_open` clears the window and moves to `HalfOpen`.
//! - **HalfOpen**: calls pass as trial traffic. Any failure opens the circuit;
//!   `success_count_to_close` successes close it.
//! - **Open**: calls are rejected without running until `keep_open_duration` has passed;
//!   the next attempt moves to `HalfOpen` and runs as the trial.
//!
//! State changes are compare-and-set on an `AtomicU8`, so only one racing transition wins.

mod outcome;
mod policy;

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

pub use outcome::{BreakerError, CallOutcome};
pub use policy::BreakerPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::HalfOpen,
            2 => CircuitState::Open,
            _ => CircuitState::Closed,
        }
    }
}

/// Observes every attempt without influencing the state machine (metrics, tracing).
pub trait CallInterceptor: Send + Sync {
    fn before_call(&self, _state: CircuitState) {}
    fn after_call(&self, _state: CircuitState, _success: bool, _elapsed: Duration) {}
    fn on_rejected(&self) {}
    fn on_transition(&self, _from: CircuitState, _to: CircuitState) {}
}

/// Shared circuit breaker. Clones observe and drive the same state.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

struct BreakerInner {
    name: String,
    policy: BreakerPolicy,
    state: AtomicU8,
    failures: Mutex<VecDeque<Instant>>,
    successes: AtomicUsize,
    opened_at: Mutex<Option<Instant>>,
    interceptors: RwLock<Vec<Arc<dyn CallInterceptor>>>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self::named("breaker", policy)
    }

    /// `name` only appears in logs. Counts below 1 in `policy` are raised to 1.
    pub fn named(name: impl Into<String>, policy: BreakerPolicy) -> Self {
        let policy = policy.normalized();
        Self {
            inner: Arc::new(BreakerInner {
                name: name.into(),
                policy,
                state: AtomicU8::new(CircuitState::Closed as u8),
                failures: Mutex::new(VecDeque::new()),
                successes: AtomicUsize::new(0),
                opened_at: Mutex::new(None),
                interceptors: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn with_interceptor(self, interceptor: Arc<dyn CallInterceptor>) -> Self {
        self.add_interceptor(interceptor);
        self
    }

    pub fn add_interceptor(&self, interceptor: Arc<dyn CallInterceptor>) {
        self.inner.interceptors.write().push(interceptor);
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.inner.policy
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Runs `f` unless the circuit is open.
    pub fn execute<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> CallOutcome<T, E> {
        let Some(state) = self.admit() else {
            return CallOutcome::CircuitOpen;
        };
        let started = Instant::now();
        let result = f();
        self.record(state, result.is_ok(), started.elapsed());
        match result {
            Ok(value) => CallOutcome::Success(value),
            Err(e) => CallOutcome::Failure(e),
        }
    }

    pub async fn execute_async<T, E, Fut>(&self, f: impl FnOnce() -> Fut) -> CallOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(state) = self.admit() else {
            return CallOutcome::CircuitOpen;
        };
        let started = Instant::now();
        let result = f().await;
        self.record(state, result.is_ok(), started.elapsed());
        match result {
            Ok(value) => CallOutcome::Success(value),
            Err(e) => CallOutcome::Failure(e),
        }
    }

    /// Value-returning call; an open circuit is always [`BreakerError::Open`].
    pub fn call<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, BreakerError<E>> {
        self.execute(f).into_result()
    }

    /// Void action honoring `throw_on_open`: `Ok(true)` ran and succeeded, `Ok(false)` was
    /// rejected by an open circuit when `throw_on_open` is off.
    pub fn run<E>(&self, action: impl FnOnce() -> Result<(), E>) -> Result<bool, BreakerError<E>> {
        match self.execute(action) {
            CallOutcome::Success(()) => Ok(true),
            CallOutcome::CircuitOpen if !self.inner.policy.throw_on_open => Ok(false),
            CallOutcome::CircuitOpen => Err(BreakerError::Open),
            CallOutcome::Failure(e) => Err(BreakerError::Failed(e)),
        }
    }

    /// Returns the state the call runs under, or `None` when rejected.
    fn admit(&self) -> Option<CircuitState> {
        let state = match self.state() {
            CircuitState::Open => {
                // No timestamp yet means the opening transition is still being recorded.
                let cooled = self
                    .inner
                    .opened_at
                    .lock()
                    .is_some_and(|at| at.elapsed() >= self.inner.policy.keep_open_duration);
                if !cooled {
                    debug!(breaker = %self.inner.name, "Call rejected, circuit open");
                    self.each_interceptor(|i| i.on_rejected());
                    return None;
                }
                // Losing the race means someone else already moved us on.
                self.transition(CircuitState::Open, CircuitState::HalfOpen);
                match self.state() {
                    CircuitState::Open => {
                        self.each_interceptor(|i| i.on_rejected());
                        return None;
                    }
                    other => other,
                }
            }
            other => other,
        };
        self.each_interceptor(|i| i.before_call(state));
        Some(state)
    }

    fn record(&self, state: CircuitState, success: bool, elapsed: Duration) {
        if success {
            self.on_success();
        } else {
            self.on_failure();
        }
        self.each_interceptor(|i| i.after_call(state, success, elapsed));
    }

    fn on_success(&self) {
        if self.state() == CircuitState::HalfOpen {
            let successes = self.inner.successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes >= self.inner.policy.success_count_to_close {
                self.transition(CircuitState::HalfOpen, CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let tripped = {
                    let mut failures = self.inner.failures.lock();
                    let now = Instant::now();
                    let window = self.inner.policy.failure_track_window;
                    while failures
                        .front()
                        .is_some_and(|at| now.duration_since(*at) > window)
                    {
                        failures.pop_front();
                    }
                    failures.push_back(now);
                    let tripped = failures.len() >= self.inner.policy.failure_count_to_open;
                    if tripped {
                        failures.clear();
                    }
                    tripped
                };
                if tripped {
                    self.transition(CircuitState::Closed, CircuitState::HalfOpen);
                }
            }
            CircuitState::HalfOpen => {
                self.inner.successes.store(0, Ordering::Release);
                self.transition(CircuitState::HalfOpen, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        let won = self
            .inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !won {
            return false;
        }
        match to {
            CircuitState::Closed => {
                *self.inner.opened_at.lock() = None;
                self.inner.failures.lock().clear();
            }
            CircuitState::HalfOpen => {
                *self.inner.opened_at.lock() = None;
                self.inner.successes.store(0, Ordering::Release);
            }
            CircuitState::Open => *self.inner.opened_at.lock() = Some(Instant::now()),
        }
        info!(breaker = %self.inner.name, ?from, ?to, "Circuit breaker state transition");
        self.each_interceptor(|i| i.on_transition(from, to));
        true
    }

    fn each_interceptor(&self, f: impl Fn(&dyn CallInterceptor)) {
        let interceptors = self.inner.interceptors.read().clone();
        for interceptor in &interceptors {
            f(interceptor.as_ref());
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("policy", &self.inner.policy)
            .finish()
    }
}
