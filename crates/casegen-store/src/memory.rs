//! In-memory reference store
//!
//! Concurrent maps per table. The request row is the unit of atomicity: a
//! patch mutates the row while its entry lock is held, and the checkpoint
//! pointer swap is the commit point, so a reader sees either the old
//! status+checkpoint pair or the new one.

use async_trait::async_trait;
use dashmap::DashMap;
use casegen_model::{
    validate_transition, CheckpointId, CodeHash, CoverageAnalysis, GenerationMetric, Request,
    RequestId, RequestStatus, SecurityAuditLog, TestCase, TestCaseId,
};

use crate::error::StoreError;
use crate::query::{Page, TestQuery};
use crate::store::{RequestPatch, Store};

/// Reference [`Store`] backed by concurrent hash maps
#[derive(Debug, Default)]
pub struct MemoryStore {
    requests: DashMap<RequestId, Request>,
    tests: DashMap<TestCaseId, TestCase>,
    /// Insertion order of tests per request
    test_order: DashMap<RequestId, Vec<TestCaseId>>,
    /// (request, code_hash) -> canonical test
    hash_index: DashMap<(RequestId, CodeHash), TestCaseId>,
    metrics: DashMap<RequestId, Vec<GenerationMetric>>,
    coverage: DashMap<RequestId, Vec<CoverageAnalysis>>,
    audit: DashMap<RequestId, Vec<SecurityAuditLog>>,
    checkpoints: DashMap<CheckpointId, (RequestId, serde_json::Value)>,
}

impl MemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of request rows
    #[inline]
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_request(&self, request: Request) -> Result<(), StoreError> {
        let id = request.id;
        if self.requests.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("request {id}")));
        }
        self.requests.insert(id, request);
        self.test_order.insert(id, Vec::new());
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> Result<Request, StoreError> {
        self.requests
            .get(&id)
            .map(|r| r.clone())
            .ok_or(StoreError::RequestNotFound(id))
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
        limit: usize,
    ) -> Result<Vec<Request>, StoreError> {
        let mut rows: Vec<Request> = self
            .requests
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(|r| r.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn commit_request(
        &self,
        id: RequestId,
        patch: RequestPatch,
    ) -> Result<Request, StoreError> {
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or(StoreError::RequestNotFound(id))?;

        if let Some(to) = patch.status {
            if to != entry.status {
                validate_transition(entry.status, to)?;
            }
        }

        // Stage the checkpoint blob first; the pointer swap below commits it.
        if let Some((checkpoint_id, blob)) = patch.checkpoint {
            self.checkpoints.insert(checkpoint_id, (id, blob));
            entry.workflow_checkpoint_id = Some(checkpoint_id);
        }

        if let Some(to) = patch.status {
            entry.status = to;
        }
        if let Some((code, message)) = patch.error {
            entry.error_code = Some(code);
            entry.error_message = Some(message);
        }
        if let Some(at) = patch.started_at {
            entry.started_at = Some(at);
        }
        if let Some(at) = patch.completed_at {
            entry.completed_at = Some(at);
        }
        if let Some(secs) = patch.duration_seconds {
            entry.duration_seconds = Some(secs);
        }
        if let Some(count) = patch.retry_count {
            entry.retry_count = count;
        }
        if let Some(summary) = patch.result_summary {
            entry.result_summary = summary;
        }

        Ok(entry.clone())
    }

    async fn delete_request(&self, id: RequestId) -> Result<(), StoreError> {
        self.requests
            .remove(&id)
            .ok_or(StoreError::RequestNotFound(id))?;
        if let Some((_, order)) = self.test_order.remove(&id) {
            for test_id in order {
                self.tests.remove(&test_id);
            }
        }
        self.hash_index.retain(|(owner, _), _| *owner != id);
        self.metrics.remove(&id);
        self.coverage.remove(&id);
        self.audit.remove(&id);
        self.checkpoints.retain(|_, (owner, _)| *owner != id);
        Ok(())
    }

    async fn insert_tests(&self, tests: Vec<TestCase>) -> Result<(), StoreError> {
        for test in tests {
            let request_id = test.request_id;
            if !self.requests.contains_key(&request_id) {
                return Err(StoreError::RequestNotFound(request_id));
            }
            self.test_order
                .entry(request_id)
                .or_default()
                .push(test.id);
            // first insert wins; duplicates point at the canonical entry
            self.hash_index
                .entry((request_id, test.code_hash))
                .or_insert(test.id);
            self.tests.insert(test.id, test);
        }
        Ok(())
    }

    async fn update_tests(&self, tests: Vec<TestCase>) -> Result<(), StoreError> {
        for test in tests {
            let id = test.id;
            match self.tests.get_mut(&id) {
                Some(mut entry) => *entry = test,
                None => return Err(StoreError::TestNotFound(id)),
            }
        }
        Ok(())
    }

    async fn get_test(&self, id: TestCaseId) -> Result<TestCase, StoreError> {
        self.tests
            .get(&id)
            .map(|t| t.clone())
            .ok_or(StoreError::TestNotFound(id))
    }

    async fn tests_for_request(&self, id: RequestId) -> Result<Vec<TestCase>, StoreError> {
        let order = self
            .test_order
            .get(&id)
            .ok_or(StoreError::RequestNotFound(id))?
            .clone();
        let mut rows = Vec::with_capacity(order.len());
        for test_id in order {
            if let Some(test) = self.tests.get(&test_id) {
                rows.push(test.clone());
            }
        }
        Ok(rows)
    }

    async fn find_test_by_hash(
        &self,
        request_id: RequestId,
        hash: CodeHash,
    ) -> Result<Option<TestCase>, StoreError> {
        let Some(test_id) = self.hash_index.get(&(request_id, hash)).map(|t| *t) else {
            return Ok(None);
        };
        Ok(self.tests.get(&test_id).map(|t| t.clone()))
    }

    async fn query_tests(&self, query: TestQuery) -> Result<Page<TestCase>, StoreError> {
        // Requests newest first, tests in insertion order within a request.
        let mut request_ids: Vec<(chrono::DateTime<chrono::Utc>, RequestId)> = self
            .requests
            .iter()
            .filter(|r| query.request_id.map_or(true, |want| r.id == want))
            .map(|r| (r.created_at, r.id))
            .collect();
        request_ids.sort_by(|a, b| b.0.cmp(&a.0));

        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut matches = Vec::new();
        for (_, request_id) in request_ids {
            let Some(order) = self.test_order.get(&request_id).map(|o| o.clone()) else {
                continue;
            };
            for test_id in order {
                let Some(test) = self.tests.get(&test_id).map(|t| t.clone()) else {
                    continue;
                };
                if !query.include_duplicates && test.is_duplicate {
                    continue;
                }
                if query.test_type.is_some_and(|t| test.test_type != t) {
                    continue;
                }
                if let Some(needle) = &needle {
                    let hit = test.name.to_lowercase().contains(needle)
                        || test.code.to_lowercase().contains(needle)
                        || test
                            .metadata
                            .tags
                            .iter()
                            .any(|t| t.to_lowercase().contains(needle));
                    if !hit {
                        continue;
                    }
                }
                matches.push(test);
            }
        }

        Ok(Page::from_matches(matches, query.page, query.page_size))
    }

    async fn insert_metric(&self, metric: GenerationMetric) -> Result<(), StoreError> {
        self.metrics
            .entry(metric.request_id)
            .or_default()
            .push(metric);
        Ok(())
    }

    async fn metrics_for_request(
        &self,
        id: RequestId,
    ) -> Result<Vec<GenerationMetric>, StoreError> {
        let mut rows = self.metrics.get(&id).map(|m| m.clone()).unwrap_or_default();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(rows)
    }

    async fn replace_coverage(
        &self,
        id: RequestId,
        rows: Vec<CoverageAnalysis>,
    ) -> Result<(), StoreError> {
        self.coverage.insert(id, rows);
        Ok(())
    }

    async fn coverage_for_request(
        &self,
        id: RequestId,
    ) -> Result<Vec<CoverageAnalysis>, StoreError> {
        let mut rows = self.coverage.get(&id).map(|c| c.clone()).unwrap_or_default();
        rows.sort_by_key(|r| r.requirement_index);
        Ok(rows)
    }

    async fn insert_audit(&self, entry: SecurityAuditLog) -> Result<(), StoreError> {
        self.audit.entry(entry.request_id).or_default().push(entry);
        Ok(())
    }

    async fn audit_for_request(
        &self,
        id: RequestId,
    ) -> Result<Vec<SecurityAuditLog>, StoreError> {
        Ok(self.audit.get(&id).map(|a| a.clone()).unwrap_or_default())
    }

    async fn get_checkpoint(&self, id: CheckpointId) -> Result<serde_json::Value, StoreError> {
        self.checkpoints
            .get(&id)
            .map(|entry| entry.1.clone())
            .ok_or(StoreError::CheckpointNotFound(id))
    }
}
