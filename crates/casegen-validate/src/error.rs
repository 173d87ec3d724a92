//! Validator error types

/// Errors surfaced by the validation machinery itself
///
/// Findings about a test are never errors; they land in the test's issue
/// list. These variants cover the machinery failing.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// Python grammar could not be loaded
    #[error("parser language error: {0}")]
    Language(String),

    /// tree-sitter returned no tree
    #[error("parser returned no tree")]
    ParserUnavailable,

    /// External sandbox analyzer failed
    #[error("sandbox analyzer error: {0}")]
    Sandbox(String),
}
