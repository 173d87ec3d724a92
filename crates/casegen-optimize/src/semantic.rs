//! Semantic deduplication
//!
//! Embeds every surviving test and folds pairs whose cosine similarity
//! reaches the threshold. Pairwise O(N²) over the kept set; a test similar
//! to several kept tests attaches to the one with the smallest index.

use casegen_llm::{cosine_similarity, Embedder};
use casegen_model::TestCase;
use futures::stream::{self, StreamExt};

use crate::error::OptimizeError;
use crate::exact::DuplicateRecord;

/// Embed kept tests and mark semantic duplicates in place
///
/// Embeddings are fetched under a bounded fan-out in input order and stored
/// on the rows. Tests already marked duplicate are neither embedded nor
/// compared.
pub async fn semantic_dedup(
    tests: &mut [TestCase],
    embedder: &dyn Embedder,
    threshold: f64,
    fanout: usize,
) -> Result<Vec<DuplicateRecord>, OptimizeError> {
    let kept: Vec<usize> = tests
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_duplicate)
        .map(|(i, _)| i)
        .collect();

    if kept.len() < 2 {
        // still embed a singleton so downstream consumers see a vector
        if let Some(&index) = kept.first() {
            if tests[index].semantic_embedding.is_none() {
                tests[index].semantic_embedding =
                    Some(embedder.embed(&tests[index].code).await?);
            }
        }
        return Ok(Vec::new());
    }

    let pending: Vec<(usize, String)> = kept
        .iter()
        .filter(|&&i| tests[i].semantic_embedding.is_none())
        .map(|&i| (i, tests[i].code.clone()))
        .collect();

    let fetched: Vec<Result<(usize, Vec<f32>), OptimizeError>> =
        stream::iter(pending.into_iter().map(|(index, code)| async move {
            let vector = embedder.embed(&code).await?;
            Ok((index, vector))
        }))
        .buffered(fanout.max(1))
        .collect()
        .await;

    for result in fetched {
        let (index, vector) = result?;
        tests[index].semantic_embedding = Some(vector);
    }

    let mut records = Vec::new();
    for j_pos in 1..kept.len() {
        let j = kept[j_pos];
        if tests[j].is_duplicate {
            continue;
        }
        for &i in &kept[..j_pos] {
            if tests[i].is_duplicate {
                continue;
            }
            let similarity = match (&tests[i].semantic_embedding, &tests[j].semantic_embedding) {
                (Some(a), Some(b)) => cosine_similarity(a, b),
                _ => 0.0,
            };
            if similarity >= threshold {
                let keeper_id = tests[i].id;
                let test = &mut tests[j];
                test.is_duplicate = true;
                test.duplicate_of = Some(keeper_id);
                test.similarity_score = Some(similarity);
                records.push(DuplicateRecord {
                    id: test.id,
                    duplicate_of: keeper_id,
                    similarity,
                    exact: false,
                });
                // smallest-index tie-break: stop at the first kept match
                break;
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casegen_llm::LlmError;
    use casegen_model::{CaseType, RequestId};
    use std::collections::HashMap;

    /// Embedder answering from a fixed text -> vector table
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(self
                .table
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
        }

        fn dim(&self) -> usize {
            3
        }
    }

    fn test_case(request: RequestId, name: &str, code: &str) -> TestCase {
        TestCase::new(request, name, code, CaseType::Automated)
    }

    fn embedder(entries: &[(&str, Vec<f32>)]) -> TableEmbedder {
        TableEmbedder {
            table: entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn similar_pair_folds_later_test() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "code_a"),
            test_case(request, "test_b", "code_b"),
        ];
        let keeper = tests[0].id;
        // cosine = 0.9
        let e = embedder(&[
            ("code_a", vec![1.0, 0.0, 0.0]),
            ("code_b", vec![0.9, (1.0f32 - 0.81).sqrt(), 0.0]),
        ]);

        let records = semantic_dedup(&mut tests, &e, 0.85, 8).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duplicate_of, keeper);
        assert!((records[0].similarity - 0.9).abs() < 1e-5);
        assert!(tests[1].is_duplicate);
        let similarity = tests[1].similarity_score.unwrap();
        assert!((similarity - 0.9).abs() < 1e-5);
    }

    #[tokio::test]
    async fn dissimilar_pair_survives() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "code_a"),
            test_case(request, "test_b", "code_b"),
        ];
        let e = embedder(&[
            ("code_a", vec![1.0, 0.0, 0.0]),
            ("code_b", vec![0.0, 1.0, 0.0]),
        ]);

        let records = semantic_dedup(&mut tests, &e, 0.85, 8).await.unwrap();
        assert!(records.is_empty());
        assert!(!tests[1].is_duplicate);
    }

    #[tokio::test]
    async fn tie_break_attaches_to_smallest_index() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "code_a"),
            test_case(request, "test_b", "code_b"),
            test_case(request, "test_c", "code_c"),
        ];
        let first = tests[0].id;
        // a and b are orthogonal; c is equidistant from both at cos = 0.707
        let e = embedder(&[
            ("code_a", vec![1.0, 0.0, 0.0]),
            ("code_b", vec![0.0, 1.0, 0.0]),
            ("code_c", vec![0.707, 0.707, 0.0]),
        ]);

        let records = semantic_dedup(&mut tests, &e, 0.6, 8).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duplicate_of, first);
    }

    #[tokio::test]
    async fn duplicates_are_not_comparison_anchors() {
        let request = RequestId::new();
        let mut tests = vec![
            test_case(request, "test_a", "code_a"),
            test_case(request, "test_b", "code_b"),
            test_case(request, "test_c", "code_c"),
        ];
        // b folds into a (cos 0.95); c is over-threshold similar to b
        // (cos ~0.92) but only 0.75-similar to the kept a, so c survives
        let e = embedder(&[
            ("code_a", vec![1.0, 0.0, 0.0]),
            ("code_b", vec![0.95, (1.0f32 - 0.9025).sqrt(), 0.0]),
            ("code_c", vec![0.75, 0.66, 0.0]),
        ]);

        let records = semantic_dedup(&mut tests, &e, 0.85, 8).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(tests[1].is_duplicate);
        assert!(!tests[2].is_duplicate);
    }

    #[tokio::test]
    async fn single_test_has_no_pairs() {
        let request = RequestId::new();
        let mut tests = vec![test_case(request, "test_a", "code_a")];
        let e = embedder(&[("code_a", vec![1.0, 0.0, 0.0])]);
        let records = semantic_dedup(&mut tests, &e, 0.85, 8).await.unwrap();
        assert!(records.is_empty());
        // the singleton still receives its embedding
        assert!(tests[0].semantic_embedding.is_some());
    }
}
