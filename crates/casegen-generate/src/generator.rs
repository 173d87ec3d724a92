//! Generator stage
//!
//! Assembles prompts, calls the LLM through the cache wrapper, and splits
//! the completion into raw test sources. Always goes through
//! [`CachedLlm`]; a run never talks to the provider directly.

use std::sync::Arc;

use casegen_llm::{CachedLlm, ChatRequest, LlmError, TokenUsage};
use casegen_model::TestType;

use crate::prompts::{self, GenerationTarget};
use crate::splitter::{self, RawTest};

/// Generator errors
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// Completion contained no recognizable test function
    #[error("generator produced no parseable tests")]
    EmptyOutput,

    /// Underlying LLM failure
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl GenerateError {
    /// Whether retrying can reasonably succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmptyOutput => false,
            Self::Llm(err) => err.is_transient(),
        }
    }
}

/// Result of one generation call
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Split tests in completion order
    pub tests: Vec<RawTest>,
    /// Model that answered
    pub model: String,
    /// Token usage of the call
    pub usage: TokenUsage,
    /// Transient retries spent inside the wrapper
    pub retries: u32,
    /// Whether the completion came out of the cache
    pub cache_hit: bool,
}

/// LLM-backed test generator
pub struct Generator {
    llm: Arc<CachedLlm>,
    model: String,
}

impl Generator {
    /// Create a generator bound to a model
    #[must_use]
    pub fn new(llm: Arc<CachedLlm>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Generate raw tests for a target
    ///
    /// `regenerate` alters the user prompt (and with it the cache key) for
    /// the one retry the pipeline grants after an empty first completion.
    ///
    /// # Errors
    /// - [`GenerateError::EmptyOutput`] when no test function was found
    /// - [`GenerateError::Llm`] when the wrapper exhausted its retries
    pub async fn generate(
        &self,
        target: &GenerationTarget,
        requirements: &[String],
        test_type: TestType,
        regenerate: bool,
    ) -> Result<GenerationResult, GenerateError> {
        let system = prompts::system_prompt(test_type);
        let user = prompts::user_prompt(target, requirements, regenerate);
        let request = ChatRequest::new(system, user, &self.model);

        let outcome = self.llm.call(&request, true).await?;
        let tests = splitter::split_tests(&outcome.response.text);
        tracing::debug!(
            count = tests.len(),
            cache_hit = outcome.cache_hit,
            "generator completion split"
        );

        if tests.is_empty() {
            return Err(GenerateError::EmptyOutput);
        }

        Ok(GenerationResult {
            tests,
            model: outcome.response.model,
            usage: outcome.response.usage,
            retries: outcome.retries,
            cache_hit: outcome.cache_hit,
        })
    }
}
