//! Backoff delay computation and jitter.

use std::time::Duration;

use rand::Rng;

use crate::constants::{GOLDEN_RATIO, MAX_BACKOFF_EXPONENT};

/// Shape of the inter-attempt delay curve.
///
/// The delay parameters (base, cap, multiplier) live on
/// [`RetryPolicy`](crate::policy::RetryPolicy); the kind selects how they
/// combine with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackoffKind {
    /// Constant delay: `base` for every attempt.
    Fixed,
    /// Linearly growing delay: `base * attempt`.
    Linear,
    /// Exponentially growing delay: `base * multiplier^(attempt - 1)`.
    Exponential,
    /// Fibonacci-approximation: `base` for the first two attempts, then the
    /// previous delay scaled by the golden ratio (≈1.618).
    ///
    /// This is a deliberate approximation of Fibonacci growth, not the true
    /// recurrence.
    FibonacciApprox,
}

impl BackoffKind {
    /// Compute the raw (pre-clamp, pre-jitter) delay for 1-based `attempt`.
    ///
    /// `previous` is the prior attempt's clamped pre-jitter delay; only the
    /// Fibonacci-approximation consults it. Arithmetic saturates rather than
    /// overflowing for large attempt numbers.
    pub fn raw_delay(
        &self,
        attempt: u32,
        previous: Option<Duration>,
        base: Duration,
        multiplier: f64,
    ) -> Duration {
        match self {
            Self::Fixed => base,
            Self::Linear => {
                let millis = (base.as_millis() as u64).saturating_mul(u64::from(attempt.max(1)));
                Duration::from_millis(millis)
            }
            Self::Exponential => {
                let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
                let millis = base.as_millis() as f64 * multiplier.powi(exponent as i32);
                Duration::from_millis(saturate_millis(millis))
            }
            Self::FibonacciApprox => {
                if attempt <= 2 {
                    return base;
                }
                let prev = previous.unwrap_or(base);
                let millis = prev.as_millis() as f64 * GOLDEN_RATIO;
                Duration::from_millis(saturate_millis(millis))
            }
        }
    }
}

/// Apply symmetric jitter: `delay * (1 ± uniform(0, fraction))`, floored at
/// zero. A fraction of 0.1 perturbs the delay by up to ±10%.
pub fn apply_jitter(delay: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 || delay.is_zero() {
        return delay;
    }

    let mut rng = rand::thread_rng();
    let millis = delay.as_millis() as f64;
    let offset = rng.gen_range(-fraction..=fraction);
    let jittered = (millis * (1.0 + offset)).max(0.0);

    Duration::from_millis(saturate_millis(jittered))
}

/// Cast float milliseconds to `u64`, saturating at the bounds.
fn saturate_millis(millis: f64) -> u64 {
    if millis.is_nan() {
        return 0;
    }
    millis as u64
}
