//! Correlation context threaded through retry and breaker log events.
//!
//! The pipeline runs one correlation identifier per publishing session so a
//! timeline can be reconstructed across the database, rendering, and upload
//! stages. The identifier is passed explicitly rather than stashed in a
//! global: every execute call takes an [`OperationContext`], and stages that
//! belong to the same outer operation share one via
//! [`OperationContext::child`].

use std::fmt;

use uuid::Uuid;

/// Identifier shared by all log events belonging to one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-call context carried into every retry and breaker log event.
#[derive(Debug, Clone)]
pub struct OperationContext {
    operation: String,
    correlation_id: CorrelationId,
}

impl OperationContext {
    /// Create a context for a named operation with a fresh correlation id.
    pub fn new(operation: impl Into<String>) -> Self {
        Self { operation: operation.into(), correlation_id: CorrelationId::new() }
    }

    /// Create a context that reuses an existing correlation id.
    pub fn with_correlation_id(operation: impl Into<String>, correlation_id: CorrelationId) -> Self {
        Self { operation: operation.into(), correlation_id }
    }

    /// Derive a context for a sub-operation sharing this correlation id.
    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self::with_correlation_id(operation, self.correlation_id)
    }

    /// The operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The correlation identifier.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for correlation context.

    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_child_context_shares_correlation_id() {
        let outer = OperationContext::new("daily_post");
        let inner = outer.child("fetch_market_rows");

        assert_eq!(outer.correlation_id(), inner.correlation_id());
        assert_eq!(inner.operation(), "fetch_market_rows");
    }

    #[test]
    fn test_with_correlation_id_propagates() {
        let id = CorrelationId::new();
        let ctx = OperationContext::with_correlation_id("upload_story", id);

        assert_eq!(ctx.correlation_id(), id);
        assert_eq!(ctx.operation(), "upload_story");
    }
}
