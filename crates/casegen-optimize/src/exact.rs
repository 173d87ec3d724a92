//! Exact deduplication
//!
//! Groups tests by the SHA-256 hash of their canonicalized source. Within a
//! group the first-inserted test (generator output order) survives; the
//! rest become duplicates with similarity 1.0.

use casegen_model::{CodeHash, TestCase, TestCaseId};
use indexmap::map::Entry;
use indexmap::IndexMap;

/// One duplicate relation produced by dedup
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DuplicateRecord {
    /// The folded test
    pub id: TestCaseId,
    /// The canonical survivor it points at
    pub duplicate_of: TestCaseId,
    /// Similarity to the survivor
    pub similarity: f64,
    /// True for hash-identical sources, false for semantic matches
    pub exact: bool,
}

/// Mark exact duplicates in place
///
/// Already-marked duplicates are skipped, which makes a second run over the
/// same slice a no-op.
pub fn exact_dedup(tests: &mut [TestCase]) -> Vec<DuplicateRecord> {
    let mut first_by_hash: IndexMap<CodeHash, usize> = IndexMap::new();
    let mut records = Vec::new();

    for index in 0..tests.len() {
        if tests[index].is_duplicate {
            continue;
        }
        match first_by_hash.entry(tests[index].code_hash) {
            Entry::Vacant(slot) => {
                slot.insert(index);
            }
            Entry::Occupied(slot) => {
                let keeper_id = tests[*slot.get()].id;
                let test = &mut tests[index];
                test.is_duplicate = true;
                test.duplicate_of = Some(keeper_id);
                test.similarity_score = Some(1.0);
                records.push(DuplicateRecord {
                    id: test.id,
                    duplicate_of: keeper_id,
                    similarity: 1.0,
                    exact: true,
                });
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegen_model::{CaseType, RequestId};

    fn test_case(request: RequestId, name: &str, code: &str) -> TestCase {
        TestCase::new(request, name, code, CaseType::Automated)
    }

    #[test]
    fn identical_sources_keep_first() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "def test():\n    assert True\n"),
            test_case(request, "test_b", "def test():\n    assert True\n"),
        ];
        let first_id = tests[0].id;
        let second_id = tests[1].id;

        let records = exact_dedup(&mut tests);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, second_id);
        assert_eq!(records[0].duplicate_of, first_id);
        assert_eq!(records[0].similarity, 1.0);

        assert!(!tests[0].is_duplicate);
        assert!(tests[1].is_duplicate);
        assert_eq!(tests[1].similarity_score, Some(1.0));
    }

    #[test]
    fn formatting_variants_are_exact_duplicates() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "assert True"),
            test_case(request, "test_b", "assert True   \r\n"),
        ];
        let records = exact_dedup(&mut tests);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn distinct_sources_survive() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "assert True"),
            test_case(request, "test_b", "assert False"),
        ];
        assert!(exact_dedup(&mut tests).is_empty());
        assert!(tests.iter().all(|t| !t.is_duplicate));
    }

    #[test]
    fn rerun_is_a_fixed_point() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "assert True"),
            test_case(request, "test_b", "assert True"),
            test_case(request, "test_c", "assert 1"),
        ];
        let first_pass = exact_dedup(&mut tests);
        assert_eq!(first_pass.len(), 1);

        let second_pass = exact_dedup(&mut tests);
        assert!(second_pass.is_empty());
    }
}
