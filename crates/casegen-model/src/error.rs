//! Error taxonomy shared across the pipeline
//!
//! Crates define their own error enums; this module carries the
//! classification every layer agrees on: retryability ([`ErrorKind`]) and
//! the stable codes a terminal `failed` request exposes ([`ErrorCode`]).

use serde::{Deserialize, Serialize};

/// Classification of a pipeline error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown request or test
    NotFound,
    /// Schema violation at ingest
    InvalidInput,
    /// Network / 5xx / rate-limit / deadline; retryable
    Transient,
    /// Parse failure after regeneration, missing credentials
    Permanent,
    /// Test rejected by the Safety Guard (per-test, never request-level)
    SafetyBlocked,
    /// Cooperative cancellation observed
    Cancelled,
    /// Checkpoint blob could not be decoded
    CheckpointCorrupt,
}

impl ErrorKind {
    /// Whether an error of this kind may be retried
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Stable machine-readable code on a terminal `failed` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Reconnaissance exhausted its retries on driver/page timeouts
    ReconTimeout,
    /// LLM stayed unreachable through the retry budget
    LlmUnavailable,
    /// Generator produced no parseable tests, including after regeneration
    EmptyOutput,
    /// Zero non-duplicate passing tests survived optimization
    NoTests,
    /// Anything else
    Internal,
}

impl ErrorCode {
    /// Snake-case wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReconTimeout => "recon_timeout",
            Self::LlmUnavailable => "llm_unavailable",
            Self::EmptyOutput => "empty_output",
            Self::NoTests => "no_tests",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::Permanent.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::CheckpointCorrupt.is_retryable());
    }

    #[test]
    fn error_code_wire_names() {
        assert_eq!(ErrorCode::ReconTimeout.as_str(), "recon_timeout");
        assert_eq!(ErrorCode::NoTests.to_string(), "no_tests");
        let json = serde_json::to_string(&ErrorCode::EmptyOutput).unwrap();
        assert_eq!(json, "\"empty_output\"");
    }
}
