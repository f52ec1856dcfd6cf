//! Structured log emission for retry and breaker lifecycles.
//!
//! Every event carries the operation name, the correlation id of the
//! enclosing operation, and a discrete `event` tag so the pipeline's JSON
//! log sink can index them: `retry_attempt`, `retry_success`,
//! `retry_aborted`, `retry_exhausted`, `circuit_breaker_state_change`,
//! `circuit_breaker_failure`, `circuit_breaker_open`,
//! `circuit_breaker_closed`. Formatting is the subscriber's concern; this
//! module only guarantees the fields.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::breaker::CircuitState;
use crate::context::OperationContext;

/// Event emitter scoped to one retry execution.
pub(crate) struct RetrySpan<'a> {
    ctx: &'a OperationContext,
    executor: &'a str,
    max_attempts: u32,
}

impl<'a> RetrySpan<'a> {
    pub(crate) fn new(ctx: &'a OperationContext, executor: &'a str, max_attempts: u32) -> Self {
        Self { ctx, executor, max_attempts }
    }

    /// A failed attempt is about to be retried after `delay`.
    pub(crate) fn attempt(&self, attempt: u32, delay: Duration, error: &str) {
        warn!(
            event = "retry_attempt",
            operation = %self.ctx.operation(),
            correlation_id = %self.ctx.correlation_id(),
            executor = self.executor,
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error,
            "attempt failed, backing off"
        );
    }

    /// The operation succeeded after at least one retry.
    pub(crate) fn success(&self, attempt: u32, total_delay: Duration) {
        info!(
            event = "retry_success",
            operation = %self.ctx.operation(),
            correlation_id = %self.ctx.correlation_id(),
            executor = self.executor,
            attempt,
            total_delay_ms = total_delay.as_millis() as u64,
            "retry succeeded"
        );
    }

    /// The retry loop stopped without consuming its attempts.
    ///
    /// `reason` distinguishes a non-retryable classification from a
    /// circuit-open refusal.
    pub(crate) fn aborted(&self, attempt: u32, reason: &str, error: &str) {
        debug!(
            event = "retry_aborted",
            operation = %self.ctx.operation(),
            correlation_id = %self.ctx.correlation_id(),
            executor = self.executor,
            attempt,
            reason,
            error,
            "retry aborted"
        );
    }

    /// Every attempt was consumed without success. `history` summarises the
    /// recorded attempts (number, delay, error) for the final failure log.
    pub(crate) fn exhausted(&self, attempts: u32, total_delay: Duration, error: &str, history: &str) {
        error!(
            event = "retry_exhausted",
            operation = %self.ctx.operation(),
            correlation_id = %self.ctx.correlation_id(),
            executor = self.executor,
            attempts,
            total_delay_ms = total_delay.as_millis() as u64,
            error,
            history,
            "all retry attempts exhausted"
        );
    }
}

/// A breaker counted a failure toward its threshold.
pub(crate) fn breaker_failure(
    name: &str,
    ctx: Option<&OperationContext>,
    failures: u32,
    error: &str,
) {
    match ctx {
        Some(ctx) => warn!(
            event = "circuit_breaker_failure",
            breaker = name,
            operation = %ctx.operation(),
            correlation_id = %ctx.correlation_id(),
            consecutive_failures = failures,
            error,
            "protected operation failed"
        ),
        None => warn!(
            event = "circuit_breaker_failure",
            breaker = name,
            consecutive_failures = failures,
            error,
            "protected operation failed"
        ),
    }
}

/// A breaker transitioned between states.
pub(crate) fn breaker_state_change(name: &str, from: CircuitState, to: CircuitState) {
    if to == CircuitState::Open {
        error!(
            event = "circuit_breaker_state_change",
            breaker = name,
            from = %from,
            to = %to,
            "circuit tripped open"
        );
    } else {
        info!(
            event = "circuit_breaker_state_change",
            breaker = name,
            from = %from,
            to = %to,
            "circuit state changed"
        );
    }
}

/// A call was refused because the circuit is open.
pub(crate) fn breaker_rejected(name: &str, ctx: &OperationContext) {
    debug!(
        event = "circuit_breaker_open",
        breaker = name,
        operation = %ctx.operation(),
        correlation_id = %ctx.correlation_id(),
        "circuit open, refusing call"
    );
}

/// A breaker fully recovered to the closed state.
pub(crate) fn breaker_closed(name: &str, successes: u32) {
    info!(
        event = "circuit_breaker_closed",
        breaker = name,
        trial_successes = successes,
        "circuit closed after recovery"
    );
}
