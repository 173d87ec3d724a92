//! Requirements-coverage analysis
//!
//! A test covers a requirement when the case-folded requirement text
//! appears in its source, or the requirement index is declared on the
//! test. Duplicates are excluded; their text is represented by the
//! canonical survivor.

use casegen_model::{CoverageAnalysis, CoverageId, RequestId, TestCase};

/// Result of coverage analysis for one request
#[derive(Debug, Clone)]
pub struct CoverageOutcome {
    /// One row per requirement, in requirement order
    pub rows: Vec<CoverageAnalysis>,
    /// Request-level score: covered / total (1.0 when no requirements)
    pub score: f64,
    /// Gap descriptions, in requirement order
    pub gaps: Vec<String>,
}

/// Analyze coverage of `requirements` by the non-duplicate tests
#[must_use]
pub fn analyze(
    request_id: RequestId,
    requirements: &[String],
    tests: &[TestCase],
) -> CoverageOutcome {
    let mut rows = Vec::with_capacity(requirements.len());
    let mut gaps = Vec::new();
    let mut covered_total = 0usize;

    for (index, requirement) in requirements.iter().enumerate() {
        let needle = requirement.to_lowercase();
        let covering: Vec<_> = tests
            .iter()
            .filter(|t| !t.is_duplicate)
            .filter(|t| {
                t.code.to_lowercase().contains(&needle) || t.covered_requirements.contains(&index)
            })
            .map(|t| t.id)
            .collect();

        let coverage_count = covering.len();
        let is_covered = coverage_count > 0;
        let has_gap = !is_covered || coverage_count < 2;
        let gap_description = if !is_covered {
            Some(format!("requirement {index} is not covered by any test"))
        } else if coverage_count < 2 {
            Some(format!("requirement {index} is covered by a single test"))
        } else {
            None
        };

        if is_covered {
            covered_total += 1;
        }
        if let Some(description) = &gap_description {
            gaps.push(description.clone());
        }

        rows.push(CoverageAnalysis {
            id: CoverageId::new(),
            request_id,
            requirement_text: requirement.clone(),
            requirement_index: index,
            is_covered,
            covering_tests: covering,
            coverage_count,
            coverage_score: (coverage_count as f64 / 2.0).min(1.0),
            has_gap,
            gap_description,
        });
    }

    let score = if requirements.is_empty() {
        1.0
    } else {
        covered_total as f64 / requirements.len() as f64
    };

    CoverageOutcome { rows, score, gaps }
}
