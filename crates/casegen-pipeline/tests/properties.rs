//! Property-based invariants
//!
//! Covers the laws the pipeline relies on: canonicalization and dedup are
//! fixed points, fallback embeddings are unit vectors, and the status
//! machine only ever moves forward.

use async_trait::async_trait;
use casegen_llm::{fallback_embedding, Embedder, LlmError};
use casegen_model::{
    allowed_transitions, canonicalize_source, validate_transition, CaseType, CodeHash, RequestId,
    RequestStatus, TestCase,
};
use casegen_optimize::Optimizer;
use proptest::prelude::*;

struct FallbackEmbedder;

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(fallback_embedding(text, 384))
    }

    fn dim(&self) -> usize {
        384
    }
}

fn forward_rank(status: RequestStatus) -> u8 {
    match status {
        RequestStatus::Pending => 0,
        RequestStatus::Reconnaissance => 1,
        RequestStatus::Generation => 2,
        RequestStatus::Validation => 3,
        RequestStatus::Optimization => 4,
        RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled => 5,
    }
}

proptest! {
    #[test]
    fn canonicalization_is_idempotent(code in "\\PC{0,200}") {
        let once = canonicalize_source(&code);
        let twice = canonicalize_source(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn canonical_hash_ignores_trailing_whitespace(
        line in "[a-z_ ()=]{1,40}",
        pad in "[ \t]{0,5}",
    ) {
        let clean = CodeHash::compute(canonicalize_source(&line).as_bytes());
        let padded_source = format!("{line}{pad}\n");
        let padded = CodeHash::compute(canonicalize_source(&padded_source).as_bytes());
        prop_assert_eq!(clean, padded);
    }

    #[test]
    fn fallback_embeddings_are_unit_vectors(text in "\\PC{0,100}") {
        let vector = fallback_embedding(&text, 384);
        prop_assert_eq!(vector.len(), 384);
        let norm: f64 = vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum();
        prop_assert!((norm.sqrt() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn status_walks_only_move_forward(choices in proptest::collection::vec(0usize..3, 0..12)) {
        let mut status = RequestStatus::Pending;
        for choice in choices {
            let next_states = allowed_transitions(status);
            if next_states.is_empty() {
                // terminal states have no exits
                prop_assert!(status.is_terminal());
                break;
            }
            let next = next_states[choice % next_states.len()];
            prop_assert!(validate_transition(status, next).is_ok());
            prop_assert!(forward_rank(next) >= forward_rank(status));
            status = next;
        }
    }

    #[test]
    fn terminal_states_reject_all_transitions(target in 0usize..8) {
        use RequestStatus::*;
        let all = [Pending, Reconnaissance, Generation, Validation, Optimization, Completed, Failed, Cancelled];
        for terminal in [Completed, Failed, Cancelled] {
            prop_assert!(validate_transition(terminal, all[target % all.len()]).is_err());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn optimizer_is_a_fixed_point(
        bodies in proptest::collection::vec("[a-z]{1,16}", 1..10),
        requirements in proptest::collection::vec("[a-z ]{1,12}", 0..3),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let request = RequestId::new();
            let tests: Vec<TestCase> = bodies
                .iter()
                .enumerate()
                .map(|(index, body)| {
                    TestCase::new(
                        request,
                        format!("test_{index}"),
                        format!("def test_{index}():\n    assert do_{body}()\n"),
                        CaseType::Automated,
                    )
                })
                .collect();

            let optimizer = Optimizer::new();
            let first = optimizer
                .optimize(request, &requirements, tests, &FallbackEmbedder)
                .await
                .expect("first pass");
            let second = optimizer
                .optimize(request, &requirements, first.tests.clone(), &FallbackEmbedder)
                .await
                .expect("second pass");

            // fixed point: unique set unchanged, nothing newly flagged
            assert_eq!(first.unique, second.unique);
            assert!(second.duplicates.is_empty());

            // duplicate rows always point at a kept row
            for test in &second.tests {
                if test.is_duplicate {
                    let keeper = test.duplicate_of.expect("duplicate_of set");
                    let target = second
                        .tests
                        .iter()
                        .find(|t| t.id == keeper)
                        .expect("keeper exists");
                    assert!(!target.is_duplicate);
                }
            }

            // coverage bookkeeping is internally consistent
            for row in &second.coverage {
                assert_eq!(row.coverage_count, row.covering_tests.len());
                assert_eq!(row.is_covered, row.coverage_count > 0);
            }
        });
    }
}
