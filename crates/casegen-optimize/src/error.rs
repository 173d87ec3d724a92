//! Optimizer error types

use casegen_llm::LlmError;

/// Errors surfaced by the optimizer
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    /// Embedding retrieval failed past the fallback
    #[error("embedding error: {0}")]
    Embedding(#[from] LlmError),
}
