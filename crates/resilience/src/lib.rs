//! Retry and circuit-breaker primitives for the Marquee publishing pipeline.
//!
//! The pipeline's outbound calls — PostgreSQL queries, headless-browser
//! rendering, social/LLM API requests — all fail in transient ways. This
//! crate wraps them with two cooperating guards:
//!
//! - [`RetryExecutor`]: re-invokes a unit of work per an immutable
//!   [`RetryPolicy`] (attempt count, backoff curve, jitter, transient-error
//!   classification), with async, sync, and `spawn_blocking` execution
//!   paths.
//! - [`CircuitBreaker`]: a three-state gate (closed / open / half-open) that
//!   trips after consecutive failures, fails fast during a cooldown, and
//!   recovers through trial calls.
//!
//! Both emit structured `tracing` events tagged for the pipeline's JSON log
//! sink, correlated through an explicitly-passed [`OperationContext`].
//!
//! ```rust,no_run
//! use marquee_resilience::{OperationContext, RetryExecutor, RetryPresets};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let executor = RetryExecutor::new("database", RetryPresets::database());
//! let ctx = OperationContext::new("fetch_market_rows");
//!
//! let rows = executor
//!     .execute(&ctx, || async { query_market_snapshot().await })
//!     .await?;
//! # Ok(())
//! # }
//! # async fn query_market_snapshot() -> Result<u32, std::io::Error> { Ok(0) }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod breaker;
pub mod classify;
pub mod constants;
pub mod context;
mod events;
pub mod executor;
pub mod metrics;
pub mod policy;
pub mod presets;
#[cfg(feature = "serde")]
pub mod serde_util;

mod error;

pub use backoff::BackoffKind;
pub use breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerBuilder, CircuitState, Clock, MockClock,
    SystemClock,
};
pub use classify::{ErrorMatcher, ErrorPredicate};
pub use context::{CorrelationId, OperationContext};
pub use error::{BreakerError, ConfigError, RetryError};
pub use executor::RetryExecutor;
pub use metrics::RetryMetrics;
pub use policy::{RetryPolicy, RetryPolicyBuilder};
pub use presets::RetryPresets;
