//! Tuned retry policies for the pipeline's protected resources.
//!
//! The pipeline selects presets by name ("database", "api", "browser") from
//! its stage configuration; [`RetryPresets::by_name`] is that lookup.

use std::time::Duration;

use crate::classify::{is_api_retryable, is_browser_transient, is_database_transient, is_rate_limited};
use crate::policy::RetryPolicy;

/// Catalog of named retry presets.
pub struct RetryPresets;

impl RetryPresets {
    /// PostgreSQL query retries: quick exponential backoff, transient
    /// database failures only.
    pub fn database() -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(10))
            .exponential_backoff()
            .jitter_fraction(0.2)
            .retry_when(is_database_transient)
            .build()
            .unwrap_or_default()
    }

    /// Outbound HTTP/LLM API retries: few attempts, server errors and
    /// transport failures only.
    pub fn api() -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(3)
            .base_delay(Duration::from_millis(250))
            .max_delay(Duration::from_secs(5))
            .exponential_backoff()
            .jitter_fraction(0.2)
            .retry_when(is_api_retryable)
            .build()
            .unwrap_or_default()
    }

    /// Headless-browser screenshot retries: permissive classification with
    /// gentler Fibonacci-approximation growth, since renderer failures are
    /// heterogeneous and restarts are slow.
    pub fn browser() -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(4)
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(15))
            .fibonacci_backoff()
            .jitter_fraction(0.1)
            .retry_when(is_browser_transient)
            .build()
            .unwrap_or_default()
    }

    /// Throttled-upstream retries: long fixed delay matched to quota windows.
    pub fn rate_limit() -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(6)
            .base_delay(Duration::from_secs(60))
            .max_delay(Duration::from_secs(60))
            .fixed_backoff()
            .jitter_fraction(0.1)
            .retry_when(is_rate_limited)
            .build()
            .unwrap_or_default()
    }

    /// Look up a preset by its configuration name.
    pub fn by_name(name: &str) -> Option<RetryPolicy> {
        match name {
            "database" => Some(Self::database()),
            "api" => Some(Self::api()),
            "browser" => Some(Self::browser()),
            "rate_limit" => Some(Self::rate_limit()),
            _ => None,
        }
    }
}
