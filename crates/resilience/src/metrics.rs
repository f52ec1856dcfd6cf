//! Summary statistics for one retry execution.

use std::fmt;
use std::time::Duration;

/// Outcome accounting for a single `execute` call.
///
/// Produced by the `*_with_metrics` executor variants; discarded once the
/// caller has read it (nothing is accumulated across calls).
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    /// Attempts made, including the first call.
    pub attempts: u32,
    /// Delay slept across all retries (excludes operation execution time).
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded.
    pub succeeded: bool,
    /// Whether the final attempt hit the per-attempt deadline.
    pub timed_out: bool,
}

impl RetryMetrics {
    /// Average delay between attempts, or `None` when nothing was retried.
    pub fn average_delay(&self) -> Option<Duration> {
        if self.attempts <= 1 {
            None
        } else {
            Some(self.total_delay / (self.attempts - 1))
        }
    }
}

impl fmt::Display for RetryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempts={} total_delay={:?} succeeded={} timed_out={}",
            self.attempts, self.total_delay, self.succeeded, self.timed_out
        )
    }
}
