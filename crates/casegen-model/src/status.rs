//! Request status state machine
//!
//! A request only moves forward through the stage order; any non-terminal
//! state may jump to `Failed` or `Cancelled`. No other jumps are legal.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Accepted, waiting for a worker
    Pending,
    /// Extracting page structure
    Reconnaissance,
    /// Generating raw tests via the LLM
    Generation,
    /// Validating and safety-screening generated tests
    Validation,
    /// Deduplicating and scoring coverage
    Optimization,
    /// Terminal: pipeline finished successfully
    Completed,
    /// Terminal: pipeline failed with a stable error code
    Failed,
    /// Terminal: cooperatively cancelled
    Cancelled,
}

impl RequestStatus {
    /// Whether this status is terminal
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Snake-case wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reconnaissance => "reconnaissance",
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::Optimization => "optimization",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from` in one legal transition
#[must_use]
pub fn allowed_transitions(from: RequestStatus) -> Vec<RequestStatus> {
    use RequestStatus::*;
    match from {
        Pending => vec![Reconnaissance, Failed, Cancelled],
        Reconnaissance => vec![Generation, Failed, Cancelled],
        Generation => vec![Validation, Failed, Cancelled],
        Validation => vec![Optimization, Failed, Cancelled],
        Optimization => vec![Completed, Failed, Cancelled],
        Completed | Failed | Cancelled => vec![],
    }
}

/// Validates a status transition
///
/// # Errors
/// Returns [`TransitionError`] when the transition is not legal.
pub fn validate_transition(
    from: RequestStatus,
    to: RequestStatus,
) -> Result<(), TransitionError> {
    if allowed_transitions(from).into_iter().any(|s| s == to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// An illegal status transition was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition: {from} -> {to}")]
pub struct TransitionError {
    /// State the request was in
    pub from: RequestStatus,
    /// State the caller attempted to move to
    pub to: RequestStatus,
}
