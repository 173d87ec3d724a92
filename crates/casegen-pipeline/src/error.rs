//! Pipeline error type
//!
//! Wraps the per-crate errors and carries the classification the
//! orchestrator retries and reports on.

use std::time::Duration;

use casegen_generate::GenerateError;
use casegen_llm::LlmError;
use casegen_model::{ErrorKind, RequestId};
use casegen_optimize::OptimizeError;
use casegen_recon::ReconError;
use casegen_store::StoreError;
use casegen_validate::ValidateError;

/// Error surfaced by the orchestrator and service facade
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Unknown request
    #[error("request not found: {0}")]
    NotFound(RequestId),

    /// Ingest-level schema violation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Checkpoint blob could not be decoded
    #[error("checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    /// Cooperative cancellation observed
    #[error("request cancelled")]
    Cancelled,

    /// Stage exceeded its deadline
    #[error("stage timed out after {0:?}")]
    StageTimeout(Duration),

    /// Zero non-duplicate passing tests survived optimization
    #[error("no tests survived optimization")]
    NoTests,

    /// Export assembly failed
    #[error("export failed: {0}")]
    Export(String),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// LLM failure past the wrapper's retries
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Reconnaissance failure past the stage retries
    #[error(transparent)]
    Recon(#[from] ReconError),

    /// Generation failure
    #[error(transparent)]
    Generate(#[from] GenerateError),

    /// Validation machinery failure
    #[error(transparent)]
    Validate(#[from] ValidateError),

    /// Optimizer failure
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

impl PipelineError {
    /// Classification per the shared taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::Store(StoreError::RequestNotFound(_))
            | Self::Store(StoreError::TestNotFound(_)) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::CheckpointCorrupt(_) => ErrorKind::CheckpointCorrupt,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::StageTimeout(_) => ErrorKind::Transient,
            Self::Llm(err) if err.is_transient() => ErrorKind::Transient,
            Self::Recon(err) if err.is_transient() => ErrorKind::Transient,
            Self::Generate(err) if err.is_transient() => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }

    /// Whether the orchestrator may retry the failed operation
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind().is_retryable()
    }
}
