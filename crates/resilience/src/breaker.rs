//! Three-state circuit breaker guarding a downstream dependency.
//!
//! One breaker instance is created per protected resource (the database, the
//! outbound API, the rendering browser) and lives for the process lifetime,
//! accumulating state across calls. Cloning a breaker shares its state, so a
//! clone can be handed to each pipeline stage touching the same dependency.
//!
//! State machine: `Closed` (initial) trips to `Open` after
//! `failure_threshold` consecutive counted failures; `Open` fails fast until
//! `recovery_timeout` has elapsed since the last failure, then lazily moves
//! to `HalfOpen` on the next state read; `HalfOpen` lets trial calls
//! through, closing after `success_threshold` consecutive successes and
//! re-opening on a single failure. There is no background timer: the
//! cooldown is re-evaluated on every state read.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::classify::ErrorMatcher;
use crate::constants::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT, DEFAULT_SUCCESS_THRESHOLD,
};
use crate::context::OperationContext;
use crate::error::{BreakerError, ConfigError};
use crate::events;

/// Monotonic time source, swappable for deterministic cooldown tests.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant.
    fn now(&self) -> Instant;
}

/// Real monotonic clock for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Controllable clock for tests: time advances only when told to.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock frozen at the current instant.
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the clock by `duration` without sleeping.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Total simulated time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures accumulate toward the threshold.
    Closed,
    /// Calls are refused until the recovery cooldown elapses.
    Open,
    /// Trial calls probe whether the dependency has recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of a breaker's counters for monitoring.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// Current state, after lazy cooldown evaluation.
    pub state: CircuitState,
    /// Consecutive counted failures.
    pub consecutive_failures: u32,
    /// Consecutive successful trial calls in the half-open state.
    pub half_open_successes: u32,
    /// Calls that reached the wrapped operation over the breaker's lifetime.
    pub total_calls: u64,
    /// Instant of the most recent counted failure.
    pub last_failure_at: Option<Instant>,
}

struct Shared<C: Clock> {
    name: String,
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    reset_on_success: bool,
    trip_on: ErrorMatcher,
    state: RwLock<CircuitState>,
    consecutive_failures: AtomicU32,
    half_open_successes: AtomicU32,
    total_calls: AtomicU64,
    last_failure_at: RwLock<Option<Instant>>,
    clock: C,
}

/// Stateful gate that fails fast while a dependency is misbehaving.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    inner: Arc<Shared<C>>,
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field(
                "consecutive_failures",
                &self.inner.consecutive_failures.load(Ordering::Acquire),
            )
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker with default thresholds and the system clock.
    pub fn new(name: impl Into<String>) -> Self {
        CircuitBreakerBuilder::new(name).build_unchecked()
    }

    /// Start building a breaker for the named resource.
    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder<SystemClock> {
        CircuitBreakerBuilder::new(name)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// The protected resource's name, used in log events.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current state. Reading re-evaluates the recovery cooldown, so an
    /// expired `Open` reports (and becomes) `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.evaluate_state()
    }

    /// Consecutive counted failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::Acquire)
    }

    /// Counters and state for monitoring.
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state(),
            consecutive_failures: self.inner.consecutive_failures.load(Ordering::Acquire),
            half_open_successes: self.inner.half_open_successes.load(Ordering::Acquire),
            total_calls: self.inner.total_calls.load(Ordering::Acquire),
            last_failure_at: read_lock(&self.inner.last_failure_at).as_ref().copied(),
        }
    }

    /// Run an async operation through the breaker.
    ///
    /// While open, returns [`BreakerError::Open`] without invoking the
    /// operation. Failures outside the breaker's expected kind propagate as
    /// [`BreakerError::Failed`] without affecting breaker state.
    pub async fn execute<F, Fut, T, E>(
        &self,
        ctx: &OperationContext,
        work: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        if self.evaluate_state() == CircuitState::Open {
            events::breaker_rejected(&self.inner.name, ctx);
            return Err(BreakerError::Open);
        }

        self.inner.total_calls.fetch_add(1, Ordering::Relaxed);

        match work().await {
            Ok(value) => {
                self.note_success();
                Ok(value)
            }
            Err(error) => {
                if self.inner.trip_on.matches(&error) {
                    self.note_failure(Some(ctx), &error.to_string());
                }
                Err(BreakerError::Failed { source: error })
            }
        }
    }

    /// Run a synchronous operation through the breaker.
    pub fn call<F, T, E>(&self, ctx: &OperationContext, work: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + 'static,
    {
        if self.evaluate_state() == CircuitState::Open {
            events::breaker_rejected(&self.inner.name, ctx);
            return Err(BreakerError::Open);
        }

        self.inner.total_calls.fetch_add(1, Ordering::Relaxed);

        match work() {
            Ok(value) => {
                self.note_success();
                Ok(value)
            }
            Err(error) => {
                if self.inner.trip_on.matches(&error) {
                    self.note_failure(Some(ctx), &error.to_string());
                }
                Err(BreakerError::Failed { source: error })
            }
        }
    }

    /// Record a success observed outside `execute`/`call`.
    pub fn record_success(&self) {
        self.note_success();
    }

    /// Record a counted failure observed outside `execute`/`call`.
    pub fn record_failure(&self) {
        self.note_failure(None, "recorded externally");
    }

    /// Force the breaker back to `Closed` and clear all counters.
    pub fn reset(&self) {
        let previous = {
            let mut state = write_lock(&self.inner.state);
            std::mem::replace(&mut *state, CircuitState::Closed)
        };
        self.inner.consecutive_failures.store(0, Ordering::Release);
        self.inner.half_open_successes.store(0, Ordering::Release);
        *write_lock(&self.inner.last_failure_at) = None;

        if previous != CircuitState::Closed {
            events::breaker_state_change(&self.inner.name, previous, CircuitState::Closed);
        }
    }

    /// Read the state, lazily transitioning `Open` to `HalfOpen` once the
    /// recovery cooldown has elapsed since the last failure.
    fn evaluate_state(&self) -> CircuitState {
        let current = *read_lock(&self.inner.state);
        if current != CircuitState::Open {
            return current;
        }

        let cooled_down = read_lock(&self.inner.last_failure_at)
            .map(|at| self.inner.clock.now().duration_since(at) >= self.inner.recovery_timeout)
            .unwrap_or(true);

        if !cooled_down {
            return CircuitState::Open;
        }

        let mut state = write_lock(&self.inner.state);
        if *state == CircuitState::Open {
            *state = CircuitState::HalfOpen;
            self.inner.half_open_successes.store(0, Ordering::Release);
            drop(state);
            events::breaker_state_change(&self.inner.name, CircuitState::Open, CircuitState::HalfOpen);
        }
        CircuitState::HalfOpen
    }

    fn note_success(&self) {
        let state = *read_lock(&self.inner.state);
        match state {
            CircuitState::Closed => {
                // The failure streak survives individual successes unless the
                // breaker was explicitly configured to forgive them.
                if self.inner.reset_on_success {
                    self.inner.consecutive_failures.store(0, Ordering::Release);
                }
            }
            CircuitState::HalfOpen => {
                let successes = self.inner.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.inner.success_threshold {
                    let mut state = write_lock(&self.inner.state);
                    if *state == CircuitState::HalfOpen {
                        *state = CircuitState::Closed;
                        self.inner.consecutive_failures.store(0, Ordering::Release);
                        self.inner.half_open_successes.store(0, Ordering::Release);
                        drop(state);
                        events::breaker_state_change(
                            &self.inner.name,
                            CircuitState::HalfOpen,
                            CircuitState::Closed,
                        );
                        events::breaker_closed(&self.inner.name, successes);
                    }
                }
            }
            CircuitState::Open => {
                warn!(breaker = %self.inner.name, "success observed while circuit is open");
            }
        }
    }

    fn note_failure(&self, ctx: Option<&OperationContext>, error: &str) {
        let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        *write_lock(&self.inner.last_failure_at) = Some(self.inner.clock.now());

        events::breaker_failure(&self.inner.name, ctx, failures, error);

        let state = *read_lock(&self.inner.state);
        match state {
            CircuitState::Closed => {
                if failures >= self.inner.failure_threshold {
                    self.trip_open(CircuitState::Closed);
                }
            }
            // One failed trial call re-opens the circuit immediately.
            CircuitState::HalfOpen => self.trip_open(CircuitState::HalfOpen),
            CircuitState::Open => {}
        }
    }

    fn trip_open(&self, from: CircuitState) {
        let mut state = write_lock(&self.inner.state);
        if *state == from {
            *state = CircuitState::Open;
            drop(state);
            events::breaker_state_change(&self.inner.name, from, CircuitState::Open);
        }
    }
}

/// Builder for [`CircuitBreaker`].
pub struct CircuitBreakerBuilder<C: Clock = SystemClock> {
    name: String,
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    reset_on_success: bool,
    trip_on: ErrorMatcher,
    clock: C,
}

impl CircuitBreakerBuilder<SystemClock> {
    /// Start from the default thresholds and the system clock.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            reset_on_success: false,
            trip_on: ErrorMatcher::Always,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> CircuitBreakerBuilder<C> {
    /// Consecutive counted failures that trip the circuit open.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Consecutive half-open successes that close the circuit.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Cooldown before an open circuit allows a trial call.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Whether a success in the closed state clears the failure streak.
    /// Defaults to `false`: only a full recovery resets the count.
    pub fn reset_on_success(mut self, reset: bool) -> Self {
        self.reset_on_success = reset;
        self
    }

    /// Which failures count toward tripping; anything else passes through
    /// without touching breaker state.
    pub fn trip_on(mut self, matcher: ErrorMatcher) -> Self {
        self.trip_on = matcher;
        self
    }

    /// Set the trip matcher from a predicate.
    pub fn trip_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.trip_on(ErrorMatcher::when(predicate))
    }

    /// Swap in a custom clock (used by tests to control the cooldown).
    pub fn clock<C2: Clock>(self, clock: C2) -> CircuitBreakerBuilder<C2> {
        CircuitBreakerBuilder {
            name: self.name,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_timeout: self.recovery_timeout,
            reset_on_success: self.reset_on_success,
            trip_on: self.trip_on,
            clock,
        }
    }

    /// Validate the thresholds and produce the breaker.
    pub fn build(self) -> Result<CircuitBreaker<C>, ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be at least 1"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be at least 1"));
        }
        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> CircuitBreaker<C> {
        CircuitBreaker {
            inner: Arc::new(Shared {
                name: self.name,
                failure_threshold: self.failure_threshold.max(1),
                success_threshold: self.success_threshold.max(1),
                recovery_timeout: self.recovery_timeout,
                reset_on_success: self.reset_on_success,
                trip_on: self.trip_on,
                state: RwLock::new(CircuitState::Closed),
                consecutive_failures: AtomicU32::new(0),
                half_open_successes: AtomicU32::new(0),
                total_calls: AtomicU64::new(0),
                last_failure_at: RwLock::new(None),
                clock: self.clock,
            }),
        }
    }
}

/// Read a lock, recovering the value if a panicking writer poisoned it.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("circuit breaker lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Write a lock, recovering the value if a panicking writer poisoned it.
fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("circuit breaker lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
