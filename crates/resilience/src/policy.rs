//! Retry policy: the immutable description of how an operation is retried.

use std::time::Duration;

use crate::backoff::{apply_jitter, BackoffKind};
use crate::classify::ErrorMatcher;
use crate::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_JITTER_FRACTION, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_MULTIPLIER, MAX_MAX_ATTEMPTS,
};
use crate::error::ConfigError;

/// Immutable retry configuration, constructed once and reused read-only
/// across many calls.
///
/// Delay bounds are not cross-validated: a policy whose `base_delay` exceeds
/// `max_delay` is accepted, and every computed delay is clamped to
/// `max_delay` at read time. Callers rely on that clamp; do not turn it into
/// a construction error.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    max_attempts: u32,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_util::duration_millis"))]
    base_delay: Duration,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_util::duration_millis"))]
    max_delay: Duration,
    multiplier: f64,
    jitter_fraction: f64,
    backoff: BackoffKind,
    #[cfg_attr(feature = "serde", serde(skip, default))]
    retry_on: ErrorMatcher,
    #[cfg_attr(feature = "serde", serde(default, with = "crate::serde_util::duration_opt_millis"))]
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            backoff: BackoffKind::Exponential,
            retry_on: ErrorMatcher::Always,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Start building a policy from the defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Total attempts, including the first call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay fed into the backoff curve.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Cap applied to every computed delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Backoff curve shape.
    pub fn backoff(&self) -> BackoffKind {
        self.backoff
    }

    /// Exponential growth factor; ignored by the other curves.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Symmetric jitter fraction.
    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    /// Opt-in per-attempt deadline; `None` leaves attempts unbounded.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Whether an error belongs to the policy's transient set.
    pub fn is_retryable(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        self.retry_on.matches(error)
    }

    /// Compute the clamped, pre-jitter delay after 1-based `attempt` failed.
    ///
    /// `previous` is the value this method returned for the prior attempt;
    /// the Fibonacci-approximation curve feeds on it. The result is clamped
    /// to `[0, max_delay]`.
    pub fn backoff_delay(&self, attempt: u32, previous: Option<Duration>) -> Duration {
        self.backoff
            .raw_delay(attempt, previous, self.base_delay, self.multiplier)
            .min(self.max_delay)
    }

    /// Perturb a computed delay by the policy's jitter fraction.
    pub fn jittered(&self, delay: Duration) -> Duration {
        apply_jitter(delay, self.jitter_fraction)
    }
}

/// Fluent builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Start from the default policy.
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    /// Set total attempts, including the first call.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set the exponential multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction, clamped to `[0, 1]`.
    pub fn jitter_fraction(mut self, fraction: f64) -> Self {
        self.policy.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Select the backoff curve.
    pub fn backoff(mut self, kind: BackoffKind) -> Self {
        self.policy.backoff = kind;
        self
    }

    /// Use a constant delay between attempts.
    pub fn fixed_backoff(self) -> Self {
        self.backoff(BackoffKind::Fixed)
    }

    /// Use a linearly growing delay.
    pub fn linear_backoff(self) -> Self {
        self.backoff(BackoffKind::Linear)
    }

    /// Use an exponentially growing delay.
    pub fn exponential_backoff(self) -> Self {
        self.backoff(BackoffKind::Exponential)
    }

    /// Use the golden-ratio Fibonacci approximation.
    pub fn fibonacci_backoff(self) -> Self {
        self.backoff(BackoffKind::FibonacciApprox)
    }

    /// Set the transient-error matcher.
    pub fn retry_on(mut self, matcher: ErrorMatcher) -> Self {
        self.policy.retry_on = matcher;
        self
    }

    /// Set the transient-error matcher from a predicate.
    pub fn retry_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.retry_on(ErrorMatcher::when(predicate))
    }

    /// Bound each attempt with a deadline (async execution paths only).
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.policy.attempt_timeout = Some(timeout);
        self
    }

    /// Validate and produce the policy.
    pub fn build(self) -> Result<RetryPolicy, ConfigError> {
        if self.policy.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be at least 1"));
        }
        if self.policy.max_attempts > MAX_MAX_ATTEMPTS {
            return Err(ConfigError::invalid(format!(
                "max_attempts must be at most {MAX_MAX_ATTEMPTS}, got {}",
                self.policy.max_attempts
            )));
        }
        if self.policy.multiplier <= 0.0 {
            return Err(ConfigError::invalid("multiplier must be greater than 0"));
        }
        Ok(self.policy)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for policy construction and delay computation.

    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(policy.base_delay(), DEFAULT_BASE_DELAY);
        assert_eq!(policy.max_delay(), DEFAULT_MAX_DELAY);
        assert_eq!(policy.backoff(), BackoffKind::Exponential);
        assert!(policy.attempt_timeout().is_none());
    }

    #[test]
    fn test_builder_sets_fields() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(250))
            .max_delay(Duration::from_secs(5))
            .fibonacci_backoff()
            .jitter_fraction(0.2)
            .attempt_timeout(Duration::from_secs(10))
            .build()
            .expect("valid policy");

        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.base_delay(), Duration::from_millis(250));
        assert_eq!(policy.backoff(), BackoffKind::FibonacciApprox);
        assert_eq!(policy.attempt_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        assert!(RetryPolicy::builder().max_attempts(0).build().is_err());
    }

    #[test]
    fn test_builder_rejects_absurd_attempts() {
        assert!(RetryPolicy::builder().max_attempts(10_000).build().is_err());
    }

    #[test]
    fn test_builder_rejects_nonpositive_multiplier() {
        assert!(RetryPolicy::builder().multiplier(0.0).build().is_err());
        assert!(RetryPolicy::builder().multiplier(-2.0).build().is_err());
    }

    #[test]
    fn test_jitter_fraction_is_clamped() {
        let policy = RetryPolicy::builder().jitter_fraction(3.0).build().expect("valid policy");
        assert_eq!(policy.jitter_fraction(), 1.0);
    }

    #[test]
    fn test_base_above_max_clamps_at_read_time() {
        // Accepted at construction; every computed delay clamps to max_delay.
        let policy = RetryPolicy::builder()
            .base_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(1))
            .fixed_backoff()
            .build()
            .expect("mis-ordered bounds are accepted");

        assert_eq!(policy.backoff_delay(1, None), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(4, None), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_delay_clamps_exponential_growth() {
        let policy = RetryPolicy::builder()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .exponential_backoff()
            .build()
            .expect("valid policy");

        assert_eq!(policy.backoff_delay(1, None), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2, None), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3, None), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4, None), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(9, None), Duration::from_millis(500));
    }

    #[test]
    fn test_retry_when_predicate() {
        let policy = RetryPolicy::builder()
            .retry_when(|e| e.to_string().contains("flaky"))
            .build()
            .expect("valid policy");

        assert!(policy.is_retryable(&std::io::Error::other("flaky link")));
        assert!(!policy.is_retryable(&std::io::Error::other("hard failure")));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_policy_serde_round_trip() {
        let policy = RetryPolicy::builder()
            .max_attempts(4)
            .base_delay(Duration::from_millis(150))
            .linear_backoff()
            .build()
            .expect("valid policy");

        let json = serde_json::to_string(&policy).expect("serializes");
        let back: RetryPolicy = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.max_attempts(), 4);
        assert_eq!(back.base_delay(), Duration::from_millis(150));
        assert_eq!(back.backoff(), BackoffKind::Linear);
    }
}
