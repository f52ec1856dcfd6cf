//! Shared defaults for retry policies and circuit breakers.

use std::time::Duration;

/// Default total attempts, including the first call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for backoff calculation.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default cap applied to every computed delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default exponential backoff multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default symmetric jitter fraction (0.1 = ±10% of the computed delay).
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;

/// Golden-ratio factor used by the Fibonacci-approximation backoff.
///
/// Each delay after the second is the previous delay multiplied by this
/// factor. This approximates Fibonacci growth; it is not the true
/// recurrence.
pub const GOLDEN_RATIO: f64 = 1.618;

/// Cap on the exponent fed into exponential backoff, preventing overflow for
/// large attempt numbers.
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Maximum allowed `max_attempts` accepted by the policy builder.
pub const MAX_MAX_ATTEMPTS: u32 = 100;

/// Circuit breaker: default consecutive failures before tripping open.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Circuit breaker: default consecutive half-open successes before closing.
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker: default cooldown before a trial call is allowed.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);
