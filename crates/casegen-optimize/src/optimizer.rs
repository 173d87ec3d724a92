//! Optimizer
//!
//! Composition of the three passes over the tests that survived
//! validation: exact dedup, semantic dedup, coverage analysis. Source text
//! is never mutated; only dedup and embedding fields change.

use casegen_llm::Embedder;
use casegen_model::{CoverageAnalysis, RequestId, TestCase, TestCaseId};

use crate::coverage;
use crate::error::OptimizeError;
use crate::exact::{exact_dedup, DuplicateRecord};
use crate::semantic::semantic_dedup;

/// Optimizer configuration
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    /// Cosine threshold for semantic duplicates
    pub similarity_threshold: f64,
    /// Concurrent embedding fetches
    pub embedding_fanout: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            embedding_fanout: 8,
        }
    }
}

/// Result of one optimizer run
#[derive(Debug, Clone, serde::Serialize)]
pub struct OptimizeOutcome {
    /// All input tests with dedup fields filled, input order preserved
    pub tests: Vec<TestCase>,
    /// Surviving test ids, insertion-order-stable
    pub unique: Vec<TestCaseId>,
    /// Duplicate relations in discovery order
    pub duplicates: Vec<DuplicateRecord>,
    /// One coverage row per requirement
    pub coverage: Vec<CoverageAnalysis>,
    /// Gap descriptions
    pub gaps: Vec<String>,
    /// Request-level coverage score
    pub coverage_score: f64,
}

/// Dedup + coverage engine
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    /// Optimizer with default thresholds
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(OptimizerConfig::default())
    }

    /// Optimizer with explicit config
    #[must_use]
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Run the optimizer over validated tests
    ///
    /// Running it again over `outcome.tests` is a fixed point: the unique
    /// set is unchanged and no new duplicates are flagged.
    pub async fn optimize(
        &self,
        request_id: RequestId,
        requirements: &[String],
        mut tests: Vec<TestCase>,
        embedder: &dyn Embedder,
    ) -> Result<OptimizeOutcome, OptimizeError> {
        let mut duplicates = exact_dedup(&mut tests);
        tracing::debug!(exact = duplicates.len(), "exact dedup complete");

        let semantic = semantic_dedup(
            &mut tests,
            embedder,
            self.config.similarity_threshold,
            self.config.embedding_fanout,
        )
        .await?;
        tracing::debug!(semantic = semantic.len(), "semantic dedup complete");
        duplicates.extend(semantic);

        let coverage = coverage::analyze(request_id, requirements, &tests);

        let unique: Vec<TestCaseId> = tests
            .iter()
            .filter(|t| !t.is_duplicate)
            .map(|t| t.id)
            .collect();

        Ok(OptimizeOutcome {
            tests,
            unique,
            duplicates,
            coverage: coverage.rows,
            gaps: coverage.gaps,
            coverage_score: coverage.score,
        })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}
