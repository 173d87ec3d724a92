//! Persistence contract
//!
//! The pipeline talks to storage exclusively through [`Store`]. The crate
//! ships [`crate::MemoryStore`] as the reference implementation; a database
//! driver is an external collaborator implementing the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use casegen_model::{
    CheckpointId, CodeHash, CoverageAnalysis, DetailMap, ErrorCode, GenerationMetric, Request,
    RequestId, RequestStatus, SecurityAuditLog, TestCase, TestCaseId,
};

use crate::error::StoreError;
use crate::query::{Page, TestQuery};

/// Mutation applied to a request row in one atomic commit
///
/// A status change and the checkpoint that produced it always travel in the
/// same patch so observers never see one without the other.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    /// New status (validated against the state machine)
    pub status: Option<RequestStatus>,
    /// Terminal failure code + message
    pub error: Option<(ErrorCode, String)>,
    /// Processing start time
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, seconds
    pub duration_seconds: Option<f64>,
    /// Stage retries consumed
    pub retry_count: Option<u32>,
    /// Completion totals
    pub result_summary: Option<DetailMap>,
    /// Checkpoint blob written with the status update
    pub checkpoint: Option<(CheckpointId, serde_json::Value)>,
}

impl RequestPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With new status
    #[inline]
    #[must_use]
    pub fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// With failure code and message
    #[inline]
    #[must_use]
    pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.error = Some((code, message.into()));
        self
    }

    /// With start timestamp
    #[inline]
    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// With completion timestamp and derived duration
    #[inline]
    #[must_use]
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// With duration in seconds
    #[inline]
    #[must_use]
    pub fn duration_seconds(mut self, secs: f64) -> Self {
        self.duration_seconds = Some(secs);
        self
    }

    /// With retry counter
    #[inline]
    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// With completion totals
    #[inline]
    #[must_use]
    pub fn result_summary(mut self, summary: DetailMap) -> Self {
        self.result_summary = Some(summary);
        self
    }

    /// With checkpoint blob
    #[inline]
    #[must_use]
    pub fn checkpoint(mut self, id: CheckpointId, blob: serde_json::Value) -> Self {
        self.checkpoint = Some((id, blob));
        self
    }
}

/// Row lifecycle operations for all five tables
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new request row
    async fn insert_request(&self, request: Request) -> Result<(), StoreError>;

    /// Fetch a request row
    async fn get_request(&self, id: RequestId) -> Result<Request, StoreError>;

    /// List requests, newest first, optionally filtered by status
    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
        limit: usize,
    ) -> Result<Vec<Request>, StoreError>;

    /// Apply a patch atomically; status changes are validated against the
    /// state machine and committed together with the checkpoint blob
    async fn commit_request(
        &self,
        id: RequestId,
        patch: RequestPatch,
    ) -> Result<Request, StoreError>;

    /// Delete a request and cascade to every owned row
    async fn delete_request(&self, id: RequestId) -> Result<(), StoreError>;

    /// Insert test rows in generator output order
    async fn insert_tests(&self, tests: Vec<TestCase>) -> Result<(), StoreError>;

    /// Replace existing test rows (dedup / coverage backfill)
    async fn update_tests(&self, tests: Vec<TestCase>) -> Result<(), StoreError>;

    /// Fetch one test row
    async fn get_test(&self, id: TestCaseId) -> Result<TestCase, StoreError>;

    /// All tests of a request in insertion order
    async fn tests_for_request(&self, id: RequestId) -> Result<Vec<TestCase>, StoreError>;

    /// Look up the canonical test for a code hash within a request
    async fn find_test_by_hash(
        &self,
        request_id: RequestId,
        hash: CodeHash,
    ) -> Result<Option<TestCase>, StoreError>;

    /// Paged search across test rows
    async fn query_tests(&self, query: TestQuery) -> Result<Page<TestCase>, StoreError>;

    /// Append a metric row (never mutated after insert)
    async fn insert_metric(&self, metric: GenerationMetric) -> Result<(), StoreError>;

    /// Metric rows of a request ordered by start time
    async fn metrics_for_request(
        &self,
        id: RequestId,
    ) -> Result<Vec<GenerationMetric>, StoreError>;

    /// Replace all coverage rows of a request
    async fn replace_coverage(
        &self,
        id: RequestId,
        rows: Vec<CoverageAnalysis>,
    ) -> Result<(), StoreError>;

    /// Coverage rows of a request ordered by requirement index
    async fn coverage_for_request(
        &self,
        id: RequestId,
    ) -> Result<Vec<CoverageAnalysis>, StoreError>;

    /// Append an audit row (never mutated after insert)
    async fn insert_audit(&self, entry: SecurityAuditLog) -> Result<(), StoreError>;

    /// Audit rows of a request in insertion order
    async fn audit_for_request(
        &self,
        id: RequestId,
    ) -> Result<Vec<SecurityAuditLog>, StoreError>;

    /// Fetch a checkpoint blob
    async fn get_checkpoint(&self, id: CheckpointId) -> Result<serde_json::Value, StoreError>;
}
