//! LLM client error types

use std::sync::Arc;

/// Errors surfaced by the LLM call wrapper
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Connection / body / decode failure in the HTTP layer
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the upstream API
    #[error("llm upstream returned {code}: {body}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Response body, truncated
        body: String,
    },

    /// Call exceeded its deadline
    #[error("llm call timed out")]
    Timeout,

    /// Token endpoint rejected or missing credentials
    #[error("missing or rejected credentials: {0}")]
    MissingCredentials(String),

    /// Endpoint for this operation is not configured
    #[error("{0} endpoint not configured")]
    NotConfigured(&'static str),

    /// Upstream answered with an unusable payload
    #[error("invalid llm response: {0}")]
    InvalidResponse(String),

    /// Error observed by another caller of the same in-flight cache entry
    #[error(transparent)]
    Shared(Arc<LlmError>),
}

impl LlmError {
    /// Whether retrying the call can reasonably succeed
    ///
    /// Network failures, 5xx, 429, and deadline expiry are transient;
    /// everything else is permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { code, .. } => *code == 429 || (500..600).contains(code),
            Self::Shared(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// Wrap an error shared out of the single-flight cache
    #[inline]
    #[must_use]
    pub fn shared(err: Arc<LlmError>) -> Self {
        Self::Shared(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::Status {
            code: 503,
            body: String::new()
        }
        .is_transient());
        assert!(LlmError::Status {
            code: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!LlmError::Status {
            code: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!LlmError::MissingCredentials("no key".into()).is_transient());
    }

    #[test]
    fn shared_delegates_classification() {
        let inner = Arc::new(LlmError::Status {
            code: 502,
            body: String::new(),
        });
        assert!(LlmError::shared(inner).is_transient());
    }
}
