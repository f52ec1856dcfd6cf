//! Retry executor: drives a unit of work through a policy's attempt loop.
//!
//! The executor is stateless between calls; everything it tracks (attempt
//! counter, previous delay, attempt records) lives for one execution and is
//! discarded. Attempts are strictly sequential; the inter-attempt delay is
//! the only suspension point. The wrapped work itself is opaque — without
//! the policy's opt-in per-attempt deadline, a hanging attempt hangs the
//! call, bounded only in attempt count, not wall-clock time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::breaker::{CircuitBreaker, Clock};
use crate::context::OperationContext;
use crate::error::{BreakerError, RetryError};
use crate::events::RetrySpan;
use crate::metrics::RetryMetrics;
use crate::policy::RetryPolicy;

/// Drives operations through one [`RetryPolicy`].
///
/// The label names the executor in log events (typically the protected
/// resource: `"database"`, `"api"`, `"browser"`); the per-call
/// [`OperationContext`] carries the operation name and correlation id.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    label: String,
    policy: RetryPolicy,
}

/// One attempt's failure, before classification.
enum Failure<E> {
    /// The work itself failed.
    Operation(E),
    /// The opt-in per-attempt deadline elapsed.
    TimedOut(Duration),
    /// A guarding circuit breaker refused the call.
    CircuitOpen,
}

impl<E: std::error::Error> Failure<E> {
    fn describe(&self) -> String {
        match self {
            Self::Operation(error) => error.to_string(),
            Self::TimedOut(limit) => format!("attempt deadline of {limit:?} exceeded"),
            Self::CircuitOpen => "circuit breaker is open".to_string(),
        }
    }
}

impl<E> From<BreakerError<E>> for Failure<E> {
    fn from(error: BreakerError<E>) -> Self {
        match error {
            BreakerError::Open => Self::CircuitOpen,
            BreakerError::Failed { source } => Self::Operation(source),
        }
    }
}

/// What to do after a failed attempt.
enum StepDecision<E> {
    /// Sleep for the computed delay, then try again.
    SleepFor(Duration),
    /// Surface this terminal error.
    Stop(RetryError<E>),
}

/// Record of one retried attempt, kept only for the final failure log.
struct AttemptRecord {
    attempt: u32,
    delay: Duration,
    error: String,
}

/// Per-execution state: counter, previous delay, records. Discarded when the
/// execution returns.
struct Attempts<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
    previous: Option<Duration>,
    total_delay: Duration,
    records: Vec<AttemptRecord>,
}

impl<'a> Attempts<'a> {
    fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, attempt: 1, previous: None, total_delay: Duration::ZERO, records: Vec::new() }
    }

    fn current(&self) -> u32 {
        self.attempt
    }

    fn total_delay(&self) -> Duration {
        self.total_delay
    }

    fn remaining(&self) -> bool {
        self.attempt < self.policy.max_attempts()
    }

    /// Compute the next delay (clamped, then jittered) and record the
    /// attempt. The pre-jitter value feeds the next computation so the
    /// Fibonacci-approximation curve stays deterministic under jitter.
    fn next_delay(&mut self, error: &str) -> Duration {
        let pre_jitter = self.policy.backoff_delay(self.attempt, self.previous);
        self.previous = Some(pre_jitter);

        let delay = self.policy.jittered(pre_jitter);
        self.total_delay += delay;
        self.records.push(AttemptRecord {
            attempt: self.attempt,
            delay,
            error: error.to_string(),
        });
        delay
    }

    fn advance(&mut self) {
        self.attempt += 1;
    }

    fn history_line(&self) -> String {
        let parts: Vec<String> = self
            .records
            .iter()
            .map(|r| format!("attempt {} (+{}ms): {}", r.attempt, r.delay.as_millis(), r.error))
            .collect();
        parts.join("; ")
    }

    fn metrics(&self, succeeded: bool, timed_out: bool) -> RetryMetrics {
        RetryMetrics { attempts: self.attempt, total_delay: self.total_delay, succeeded, timed_out }
    }
}

impl RetryExecutor {
    /// Create an executor with a label used in log events.
    pub fn new(label: impl Into<String>, policy: RetryPolicy) -> Self {
        Self { label: label.into(), policy }
    }

    /// Create an executor with the generic `"retry"` label.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::new("retry", policy)
    }

    /// The executor's log label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The bound policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run an async operation until it succeeds, fails terminally, or the
    /// policy's attempts are exhausted.
    ///
    /// The final failure is always surfaced: exhaustion returns the last
    /// attempt's error inside [`RetryError::Exhausted`], a non-retryable
    /// failure returns immediately inside [`RetryError::Aborted`].
    pub async fn execute<F, Fut, T, E>(
        &self,
        ctx: &OperationContext,
        work: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        self.execute_with_metrics(ctx, work).await.0
    }

    /// [`execute`](Self::execute), also returning attempt accounting.
    pub async fn execute_with_metrics<F, Fut, T, E>(
        &self,
        ctx: &OperationContext,
        mut work: F,
    ) -> (Result<T, RetryError<E>>, RetryMetrics)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let span = RetrySpan::new(ctx, &self.label, self.policy.max_attempts());
        let mut attempts = Attempts::new(&self.policy);

        loop {
            let outcome = match self.policy.attempt_timeout() {
                Some(limit) => match tokio::time::timeout(limit, work()).await {
                    Ok(result) => result.map_err(Failure::Operation),
                    Err(_) => Err(Failure::TimedOut(limit)),
                },
                None => work().await.map_err(Failure::Operation),
            };

            match outcome {
                Ok(value) => {
                    if attempts.current() > 1 {
                        span.success(attempts.current(), attempts.total_delay());
                    }
                    let metrics = attempts.metrics(true, false);
                    return (Ok(value), metrics);
                }
                Err(failure) => match self.assess(&span, &mut attempts, failure) {
                    StepDecision::SleepFor(delay) => tokio::time::sleep(delay).await,
                    StepDecision::Stop(error) => {
                        let timed_out = matches!(error, RetryError::TimedOut { .. });
                        let metrics = attempts.metrics(false, timed_out);
                        return (Err(error), metrics);
                    }
                },
            }
        }
    }

    /// Run a synchronous operation from an async context without blocking
    /// the event loop: each attempt is dispatched via
    /// `tokio::task::spawn_blocking`.
    pub async fn execute_blocking<F, T, E>(
        &self,
        ctx: &OperationContext,
        work: F,
    ) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let work = Arc::new(work);
        self.execute(ctx, || {
            let work = Arc::clone(&work);
            async move {
                match tokio::task::spawn_blocking(move || work()).await {
                    Ok(result) => result,
                    // A panicking attempt propagates its unwind; losing a
                    // blocking task any other way only happens at runtime
                    // shutdown.
                    Err(join_error) => match join_error.try_into_panic() {
                        Ok(payload) => std::panic::resume_unwind(payload),
                        Err(join_error) => std::panic::resume_unwind(Box::new(join_error)),
                    },
                }
            }
        })
        .await
    }

    /// Run an async operation behind a circuit breaker.
    ///
    /// Operation failures are classified and retried per the policy; a
    /// breaker-open refusal is not an operation failure and aborts the loop
    /// immediately with [`RetryError::CircuitOpen`].
    pub async fn execute_with_breaker<C, F, Fut, T, E>(
        &self,
        ctx: &OperationContext,
        breaker: &CircuitBreaker<C>,
        mut work: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Clock,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let span = RetrySpan::new(ctx, &self.label, self.policy.max_attempts());
        let mut attempts = Attempts::new(&self.policy);

        loop {
            let outcome = match self.policy.attempt_timeout() {
                Some(limit) => {
                    match tokio::time::timeout(limit, breaker.execute(ctx, || work())).await {
                        Ok(result) => result.map_err(Failure::from),
                        Err(_) => Err(Failure::TimedOut(limit)),
                    }
                }
                None => breaker.execute(ctx, || work()).await.map_err(Failure::from),
            };

            match outcome {
                Ok(value) => {
                    if attempts.current() > 1 {
                        span.success(attempts.current(), attempts.total_delay());
                    }
                    return Ok(value);
                }
                Err(failure) => match self.assess(&span, &mut attempts, failure) {
                    StepDecision::SleepFor(delay) => tokio::time::sleep(delay).await,
                    StepDecision::Stop(error) => return Err(error),
                },
            }
        }
    }

    /// Run a synchronous operation on the calling thread, sleeping between
    /// attempts with `std::thread::sleep`.
    ///
    /// Do not call from inside an async runtime; use
    /// [`execute_blocking`](Self::execute_blocking) there instead. The
    /// policy's per-attempt deadline is honored on the async paths only.
    pub fn execute_sync<F, T, E>(&self, ctx: &OperationContext, work: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: std::error::Error + 'static,
    {
        self.execute_sync_with_metrics(ctx, work).0
    }

    /// [`execute_sync`](Self::execute_sync), also returning attempt
    /// accounting.
    pub fn execute_sync_with_metrics<F, T, E>(
        &self,
        ctx: &OperationContext,
        mut work: F,
    ) -> (Result<T, RetryError<E>>, RetryMetrics)
    where
        F: FnMut() -> Result<T, E>,
        E: std::error::Error + 'static,
    {
        let span = RetrySpan::new(ctx, &self.label, self.policy.max_attempts());
        let mut attempts = Attempts::new(&self.policy);

        loop {
            match work() {
                Ok(value) => {
                    if attempts.current() > 1 {
                        span.success(attempts.current(), attempts.total_delay());
                    }
                    let metrics = attempts.metrics(true, false);
                    return (Ok(value), metrics);
                }
                Err(error) => {
                    match self.assess(&span, &mut attempts, Failure::Operation(error)) {
                        StepDecision::SleepFor(delay) => std::thread::sleep(delay),
                        StepDecision::Stop(error) => {
                            let metrics = attempts.metrics(false, false);
                            return (Err(error), metrics);
                        }
                    }
                }
            }
        }
    }

    /// Classify a failed attempt: abort, exhaust, or back off and retry.
    fn assess<E>(
        &self,
        span: &RetrySpan<'_>,
        attempts: &mut Attempts<'_>,
        failure: Failure<E>,
    ) -> StepDecision<E>
    where
        E: std::error::Error + 'static,
    {
        let attempt = attempts.current();
        let descr = failure.describe();

        match failure {
            Failure::CircuitOpen => {
                span.aborted(attempt, "circuit_open", &descr);
                StepDecision::Stop(RetryError::CircuitOpen)
            }
            Failure::Operation(error) => {
                if !self.policy.is_retryable(&error) {
                    span.aborted(attempt, "not_retryable", &descr);
                    return StepDecision::Stop(RetryError::Aborted { source: error });
                }
                if !attempts.remaining() {
                    debug!(attempt, executor = %self.label, "max attempts reached");
                    span.exhausted(
                        attempt,
                        attempts.total_delay(),
                        &descr,
                        &attempts.history_line(),
                    );
                    return StepDecision::Stop(RetryError::Exhausted {
                        attempts: attempt,
                        source: error,
                    });
                }
                let delay = attempts.next_delay(&descr);
                span.attempt(attempt, delay, &descr);
                attempts.advance();
                StepDecision::SleepFor(delay)
            }
            Failure::TimedOut(limit) => {
                // Deadline overruns are transient by definition; they retry
                // regardless of the policy's error matcher.
                if !attempts.remaining() {
                    debug!(attempt, executor = %self.label, "max attempts reached");
                    span.exhausted(
                        attempt,
                        attempts.total_delay(),
                        &descr,
                        &attempts.history_line(),
                    );
                    return StepDecision::Stop(RetryError::TimedOut { attempt, timeout: limit });
                }
                let delay = attempts.next_delay(&descr);
                span.attempt(attempt, delay, &descr);
                attempts.advance();
                StepDecision::SleepFor(delay)
            }
        }
    }
}
