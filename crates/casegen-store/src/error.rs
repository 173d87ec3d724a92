//! Store error types

use casegen_model::{RequestId, TestCaseId, TransitionError};

/// Errors surfaced by the persistence adapter
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Request row does not exist
    #[error("request not found: {0}")]
    RequestNotFound(RequestId),

    /// Test row does not exist
    #[error("test case not found: {0}")]
    TestNotFound(TestCaseId),

    /// Checkpoint blob does not exist
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(casegen_model::CheckpointId),

    /// Status patch violates the state machine
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    /// Row already exists
    #[error("duplicate row: {0}")]
    Duplicate(String),

    /// Backend failure (connection, serialization, ...)
    #[error("storage backend error: {0}")]
    Backend(String),
}
