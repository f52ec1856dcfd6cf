//! Error types for retry and circuit-breaker operations.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`RetryExecutor`](crate::executor::RetryExecutor).
///
/// Terminal failures always carry the underlying operation error by value:
/// the executor suppresses intermediate attempt failures (turning them into
/// retries) but never the final one. Use [`RetryError::into_source`] to
/// recover the original error for downstream handling.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt was consumed; `source` is the failure from the final
    /// attempt, unchanged.
    #[error("retry attempts exhausted after {attempts} attempts: {source}")]
    Exhausted {
        /// Total attempts made, including the first call.
        attempts: u32,
        /// The final attempt's failure.
        source: E,
    },

    /// The first non-retryable failure; the operation was not re-invoked.
    #[error("operation failed with non-retryable error: {source}")]
    Aborted {
        /// The failure that stopped the retry loop.
        source: E,
    },

    /// An attempt exceeded the policy's opt-in per-attempt deadline and no
    /// further attempts remained.
    #[error("attempt {attempt} timed out after {timeout:?}")]
    TimedOut {
        /// The attempt that hit the deadline.
        attempt: u32,
        /// The configured per-attempt deadline.
        timeout: Duration,
    },

    /// The guarding circuit breaker was open; the operation was not invoked.
    ///
    /// Distinct from an operation failure so callers can surface a
    /// "service unavailable" response instead of a specific error.
    #[error("circuit breaker is open, refusing to call the operation")]
    CircuitOpen,
}

impl<E> RetryError<E> {
    /// Consume the error and return the underlying operation failure, if one
    /// was recorded.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted { source } => Some(source),
            Self::TimedOut { .. } | Self::CircuitOpen => None,
        }
    }

    /// Borrow the underlying operation failure, if one was recorded.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted { source } => Some(source),
            Self::TimedOut { .. } | Self::CircuitOpen => None,
        }
    }

    /// Whether this is the fail-fast circuit-open refusal rather than a
    /// genuine operation failure.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }
}

/// Errors surfaced by [`CircuitBreaker`](crate::breaker::CircuitBreaker).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the wrapped operation was not invoked.
    #[error("circuit breaker is open, rejecting calls")]
    Open,

    /// The wrapped operation was invoked and failed.
    #[error("operation failed: {source}")]
    Failed {
        /// The operation's own failure.
        source: E,
    },
}

impl<E> BreakerError<E> {
    /// Consume the error and return the operation failure, if the operation
    /// actually ran.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Open => None,
            Self::Failed { source } => Some(source),
        }
    }

    /// Whether this is the fail-fast refusal rather than an operation failure.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Configuration validation error for policy and breaker builders.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value was rejected.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Human-readable rejection reason.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error types.

    use super::*;

    #[test]
    fn test_retry_error_display() {
        let err = RetryError::Exhausted { attempts: 5, source: std::io::Error::other("boom") };
        assert!(err.to_string().contains("5 attempts"));

        let err: RetryError<std::io::Error> =
            RetryError::TimedOut { attempt: 2, timeout: Duration::from_secs(3) };
        assert!(err.to_string().contains("timed out"));

        let err: RetryError<std::io::Error> = RetryError::CircuitOpen;
        assert!(err.to_string().contains("circuit breaker"));
    }

    #[test]
    fn test_retry_error_into_source() {
        let err = RetryError::Aborted { source: std::io::Error::other("fatal") };
        let source = err.into_source().expect("aborted carries its source");
        assert_eq!(source.to_string(), "fatal");

        let err: RetryError<std::io::Error> = RetryError::CircuitOpen;
        assert!(err.into_source().is_none());
    }

    #[test]
    fn test_retry_error_is_circuit_open() {
        let err: RetryError<std::io::Error> = RetryError::CircuitOpen;
        assert!(err.is_circuit_open());

        let err = RetryError::Aborted { source: std::io::Error::other("fatal") };
        assert!(!err.is_circuit_open());
    }

    #[test]
    fn test_breaker_error_distinguishes_refusal_from_failure() {
        let open: BreakerError<std::io::Error> = BreakerError::Open;
        assert!(open.is_open());
        assert!(open.into_source().is_none());

        let failed = BreakerError::Failed { source: std::io::Error::other("downstream") };
        assert!(!failed.is_open());
        assert!(failed.into_source().is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("max_attempts must be at least 1");
        assert!(err.to_string().contains("max_attempts"));
    }
}
