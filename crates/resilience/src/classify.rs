//! Failure classification: which errors count as transient.
//!
//! Policies carry an [`ErrorMatcher`] describing the set of error kinds
//! treated as transient; anything outside the set is surfaced immediately
//! without retry. Circuit breakers use the same type to decide which
//! failures count toward tripping. The stock classifiers match on the error
//! message because the pipeline's collaborators (database driver, HTTP
//! client, headless browser) each raise their own error types; downcasting
//! across that zoo is not practical at this seam.

use std::fmt;
use std::sync::Arc;

/// Predicate over a dynamically-typed error.
pub type ErrorPredicate = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>;

/// The set of error kinds a policy or breaker reacts to.
pub enum ErrorMatcher {
    /// Match every error.
    Always,
    /// Match errors accepted by the predicate.
    Custom(ErrorPredicate),
}

impl ErrorMatcher {
    /// Build a matcher from a predicate.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Whether the matcher accepts this error.
    pub fn matches(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        match self {
            Self::Always => true,
            Self::Custom(predicate) => predicate(error),
        }
    }
}

impl Clone for ErrorMatcher {
    fn clone(&self) -> Self {
        match self {
            Self::Always => Self::Always,
            Self::Custom(predicate) => Self::Custom(Arc::clone(predicate)),
        }
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Custom(_) => write!(f, "Custom(<predicate>)"),
        }
    }
}

impl Default for ErrorMatcher {
    fn default() -> Self {
        Self::Always
    }
}

/// Connection-level network failure: resets, refusals, DNS trouble.
pub fn is_connection_error(error: &(dyn std::error::Error + 'static)) -> bool {
    let text = error.to_string().to_lowercase();
    text.contains("connection")
        || text.contains("timeout")
        || text.contains("timed out")
        || text.contains("network")
        || text.contains("dns")
        || text.contains("refused")
        || text.contains("reset")
        || text.contains("broken pipe")
        || text.contains("unreachable")
}

/// Transient database failure: lock contention, pool exhaustion, dropped
/// connections. Programming errors (bad SQL, constraint violations) do not
/// match.
pub fn is_database_transient(error: &(dyn std::error::Error + 'static)) -> bool {
    let text = error.to_string().to_lowercase();
    text.contains("deadlock")
        || text.contains("lock")
        || text.contains("busy")
        || text.contains("too many connections")
        || text.contains("connection pool")
        || text.contains("could not connect")
        || text.contains("serialization failure")
        || text.contains("server closed the connection")
        || is_connection_error(error)
}

/// Throttling response from an upstream service.
pub fn is_rate_limited(error: &(dyn std::error::Error + 'static)) -> bool {
    let text = error.to_string().to_lowercase();
    text.contains("rate limit")
        || text.contains("too many requests")
        || text.contains("429")
        || text.contains("throttl")
        || text.contains("quota exceeded")
}

/// Retryable failure from an outbound HTTP/LLM API call.
///
/// Client errors (4xx) are permanent and never match, with the exception of
/// throttling; server errors and transport failures match.
pub fn is_api_retryable(error: &(dyn std::error::Error + 'static)) -> bool {
    let text = error.to_string().to_lowercase();

    if is_rate_limited(error) {
        return true;
    }

    if text.contains("400")
        || text.contains("401")
        || text.contains("403")
        || text.contains("404")
        || text.contains("405")
        || text.contains("409")
        || text.contains("unauthorized")
        || text.contains("forbidden")
    {
        return false;
    }

    text.contains("500")
        || text.contains("502")
        || text.contains("503")
        || text.contains("504")
        || text.contains("gateway")
        || text.contains("service unavailable")
        || is_connection_error(error)
}

/// Retryable headless-browser failure.
///
/// Browser automation fails in heterogeneous ways (renderer crashes, target
/// closed, navigation timeouts), so this classifier is permissive: anything
/// that does not look like a caller bug (bad selector, bad URL, protocol
/// misuse) matches.
pub fn is_browser_transient(error: &(dyn std::error::Error + 'static)) -> bool {
    let text = error.to_string().to_lowercase();
    !(text.contains("invalid selector")
        || text.contains("malformed url")
        || text.contains("invalid url")
        || text.contains("unsupported")
        || text.contains("protocol error: invalid"))
}

#[cfg(test)]
mod tests {
    //! Unit tests for failure classification.

    use super::*;

    fn err(message: &str) -> std::io::Error {
        std::io::Error::other(message.to_string())
    }

    #[test]
    fn test_always_matches_everything() {
        let matcher = ErrorMatcher::Always;
        assert!(matcher.matches(&err("anything at all")));
    }

    #[test]
    fn test_custom_matcher_uses_predicate() {
        let matcher = ErrorMatcher::when(|e| e.to_string().contains("transient"));
        assert!(matcher.matches(&err("transient glitch")));
        assert!(!matcher.matches(&err("permanent damage")));
    }

    #[test]
    fn test_clone_shares_predicate() {
        let matcher = ErrorMatcher::when(|e| e.to_string().contains("yes"));
        let cloned = matcher.clone();
        assert!(cloned.matches(&err("yes")));
        assert!(!cloned.matches(&err("no")));
    }

    #[test]
    fn test_connection_error_patterns() {
        assert!(is_connection_error(&err("connection reset by peer")));
        assert!(is_connection_error(&err("DNS lookup failed")));
        assert!(is_connection_error(&err("operation timed out")));
        assert!(!is_connection_error(&err("syntax error near SELECT")));
    }

    #[test]
    fn test_database_transient_patterns() {
        assert!(is_database_transient(&err("deadlock detected")));
        assert!(is_database_transient(&err("connection pool exhausted")));
        assert!(is_database_transient(&err("database is locked")));
        assert!(!is_database_transient(&err("column \"prize\" does not exist")));
    }

    #[test]
    fn test_api_classifier_rejects_client_errors() {
        assert!(!is_api_retryable(&err("HTTP 401 unauthorized")));
        assert!(!is_api_retryable(&err("HTTP 404 not found")));
        assert!(is_api_retryable(&err("HTTP 503 service unavailable")));
        assert!(is_api_retryable(&err("HTTP 429 too many requests")));
        assert!(is_api_retryable(&err("connection refused")));
    }

    #[test]
    fn test_browser_classifier_is_permissive() {
        assert!(is_browser_transient(&err("target closed unexpectedly")));
        assert!(is_browser_transient(&err("navigation timeout of 30000ms exceeded")));
        assert!(!is_browser_transient(&err("invalid selector: .missing[")));
    }

    #[test]
    fn test_rate_limit_patterns() {
        assert!(is_rate_limited(&err("quota exceeded for today")));
        assert!(is_rate_limited(&err("request was throttled")));
        assert!(!is_rate_limited(&err("internal server error")));
    }
}
