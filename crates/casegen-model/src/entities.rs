//! Persisted entities
//!
//! Row types for the five tables the pipeline writes: requests, test cases,
//! generation metrics, coverage analyses, and security audit logs.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::hash::CodeHash;
use crate::ids::{AuditId, CheckpointId, CoverageId, MetricId, RequestId, TestCaseId};
use crate::status::RequestStatus;

/// Free-form map attached to several rows (insertion-order preserving)
pub type DetailMap = IndexMap<String, serde_json::Value>;

/// Kind of tests a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Browser/UI tests against the page structure
    Ui,
    /// API tests against OpenAPI endpoints
    Api,
    /// Manual test procedures
    Manual,
    /// Automated test scripts
    Automated,
    /// Both manual and automated
    Both,
}

/// Kind of a single generated test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    /// Manual procedure
    Manual,
    /// Automated script
    Automated,
}

/// Per-test validation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// All checks clean
    Passed,
    /// Non-fatal findings
    Warning,
    /// Blocked; kept only for audit
    Failed,
}

/// Safety classification of a test source
///
/// Ordered: `Safe < Low < Medium < High < Critical`. A test's overall risk
/// is the maximum contribution across safety sub-layers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// No findings
    Safe,
    /// Informational
    Low,
    /// Warn but allow
    Medium,
    /// Block
    High,
    /// Block, dangerous primitive present
    Critical,
}

impl RiskLevel {
    /// Whether this risk level blocks a test from the corpus
    #[inline]
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        *self >= Self::High
    }
}

/// Pipeline stage that produced a metric row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    /// Page-structure extraction
    Reconnaissance,
    /// LLM test generation
    Generator,
    /// Validation + safety guard
    Validator,
    /// Dedup + coverage
    Optimizer,
}

impl AgentName {
    /// 1-based step number within the stage order
    #[inline]
    #[must_use]
    pub fn step_number(&self) -> u32 {
        match self {
            Self::Reconnaissance => 1,
            Self::Generator => 2,
            Self::Validator => 3,
            Self::Optimizer => 4,
        }
    }

    /// The request status a request carries while this stage runs
    #[inline]
    #[must_use]
    pub fn running_status(&self) -> RequestStatus {
        match self {
            Self::Reconnaissance => RequestStatus::Reconnaissance,
            Self::Generator => RequestStatus::Generation,
            Self::Validator => RequestStatus::Validation,
            Self::Optimizer => RequestStatus::Optimization,
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Reconnaissance => "reconnaissance",
            Self::Generator => "generator",
            Self::Validator => "validator",
            Self::Optimizer => "optimizer",
        };
        f.write_str(s)
    }
}

/// Outcome of one stage execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    /// Attempt succeeded
    Success,
    /// Attempt failed terminally
    Failed,
    /// Attempt failed and will be retried
    Retry,
}

/// Safety Guard sub-layer that produced an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLayer {
    /// Regex blacklist over raw source
    Static,
    /// Parse-tree import/builtin analysis
    Ast,
    /// File-write / file-delete pattern scan
    Behavioral,
    /// External sandbox analyzer (interface only)
    Sandbox,
}

/// Disposition recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    /// No action needed
    Allowed,
    /// Test excluded from the corpus
    Blocked,
    /// Finding recorded, test kept
    Warning,
    /// Test sent back for regeneration
    Regenerate,
}

/// Layer a validation issue originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLayer {
    /// Parse failure
    Syntax,
    /// Metadata / assertion checks
    Semantic,
    /// Loop / synchronization heuristics
    Logic,
    /// Safety guard findings
    Safety,
}

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Hard finding
    Error,
    /// Advisory finding
    Warning,
}

/// One finding attached to a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Originating layer
    pub layer: IssueLayer,
    /// Severity
    pub severity: IssueSeverity,
    /// Stable machine-readable code (e.g. `missing_feature_decorator`)
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    /// Create a new issue
    #[inline]
    #[must_use]
    pub fn new(
        layer: IssueLayer,
        severity: IssueSeverity,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            layer,
            severity,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Metadata tags extracted from a test's decorators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMetadata {
    /// Feature label
    pub feature: Option<String>,
    /// Story label
    pub story: Option<String>,
    /// Display title
    pub title: Option<String>,
    /// Severity label
    pub severity: Option<String>,
    /// Free-form tags
    pub tags: Vec<String>,
}

impl TestMetadata {
    /// Whether all required tags (feature, story, title, severity or a tag)
    /// are present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.feature.is_some()
            && self.story.is_some()
            && self.title.is_some()
            && (self.severity.is_some() || !self.tags.is_empty())
    }
}

/// One generation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request id
    pub id: RequestId,
    /// Owning principal, when known
    pub owner: Option<String>,
    /// Target URL (web page or OpenAPI document)
    pub url: String,
    /// Ordered natural-language requirements
    pub requirements: Vec<String>,
    /// Requested test kind
    pub test_type: TestType,
    /// Current lifecycle status
    pub status: RequestStatus,
    /// Totals written on completion
    pub result_summary: DetailMap,
    /// Stable failure code for terminal `failed`
    pub error_code: Option<ErrorCode>,
    /// Human-readable failure description
    pub error_message: Option<String>,
    /// Stage retries consumed so far
    pub retry_count: u32,
    /// Retry budget
    pub max_retries: u32,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Set when the orchestrator picks the job up
    pub started_at: Option<DateTime<Utc>>,
    /// Set on reaching a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, seconds
    pub duration_seconds: Option<f64>,
    /// Latest checkpoint blob, if any
    pub workflow_checkpoint_id: Option<CheckpointId>,
}

impl Request {
    /// Create a new pending request
    #[must_use]
    pub fn new(url: impl Into<String>, requirements: Vec<String>, test_type: TestType) -> Self {
        Self {
            id: RequestId::new(),
            owner: None,
            url: url.into(),
            requirements,
            test_type,
            status: RequestStatus::Pending,
            result_summary: DetailMap::new(),
            error_code: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            workflow_checkpoint_id: None,
        }
    }

    /// With owning principal
    #[inline]
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// With retry budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }
}

/// One generated test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Test id
    pub id: TestCaseId,
    /// Owning request
    pub request_id: RequestId,
    /// Function name
    pub name: String,
    /// Full source text; never mutated after generation
    pub code: String,
    /// Manual or automated
    pub test_type: CaseType,
    /// Extracted decorator metadata
    pub metadata: TestMetadata,
    /// SHA-256 of the canonicalized source
    pub code_hash: CodeHash,
    /// Fingerprint of the comment/whitespace-stripped parse tree
    pub ast_hash: Option<CodeHash>,
    /// Fixed-dimension embedding, when computed
    pub semantic_embedding: Option<Vec<f32>>,
    /// Indices into the request's requirements this test addresses
    pub covered_requirements: Vec<usize>,
    /// Priority 1..=10
    pub priority: u8,
    /// Validation outcome
    pub validation_status: ValidationStatus,
    /// Ordered findings
    pub validation_issues: Vec<ValidationIssue>,
    /// Maximum safety contribution across sub-layers
    pub safety_risk_level: RiskLevel,
    /// Whether this test was folded into a canonical survivor
    pub is_duplicate: bool,
    /// The survivor this duplicate points at
    pub duplicate_of: Option<TestCaseId>,
    /// Similarity to the survivor (1.0 for exact duplicates)
    pub similarity_score: Option<f64>,
}

impl TestCase {
    /// Create a test case from generated source
    ///
    /// `code_hash` is computed over the canonicalized source; validation and
    /// dedup fields start at their defaults.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        name: impl Into<String>,
        code: impl Into<String>,
        test_type: CaseType,
    ) -> Self {
        let code = code.into();
        let code_hash = CodeHash::compute(crate::hash::canonicalize_source(&code).as_bytes());
        Self {
            id: TestCaseId::new(),
            request_id,
            name: name.into(),
            code,
            test_type,
            metadata: TestMetadata::default(),
            code_hash,
            ast_hash: None,
            semantic_embedding: None,
            covered_requirements: Vec::new(),
            priority: 5,
            validation_status: ValidationStatus::Passed,
            validation_issues: Vec::new(),
            safety_risk_level: RiskLevel::Safe,
            is_duplicate: false,
            duplicate_of: None,
            similarity_score: None,
        }
    }

    /// Whether the test survives into the export corpus
    #[inline]
    #[must_use]
    pub fn is_exportable(&self) -> bool {
        self.validation_status != ValidationStatus::Failed && !self.is_duplicate
    }
}

/// LLM usage captured on a metric row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmUsageMetric {
    /// Model identifier
    pub model: String,
    /// Prompt tokens
    pub tokens_input: u64,
    /// Completion tokens
    pub tokens_output: u64,
    /// Total tokens
    pub tokens_total: u64,
    /// Billed cost, when the provider reports one
    pub cost_usd: Option<f64>,
}

/// One stage execution record (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetric {
    /// Metric id
    pub id: MetricId,
    /// Owning request
    pub request_id: RequestId,
    /// Stage that executed
    pub agent_name: AgentName,
    /// 1-based step number
    pub step_number: u32,
    /// Attempt start
    pub started_at: DateTime<Utc>,
    /// Attempt end
    pub completed_at: DateTime<Utc>,
    /// Attempt duration, milliseconds
    pub duration_ms: u64,
    /// LLM usage, when the stage called the model
    pub usage: Option<LlmUsageMetric>,
    /// Attempt outcome
    pub status: MetricStatus,
    /// Failure description for `failed` / `retry`
    pub error_message: Option<String>,
    /// Stage-specific counters
    pub agent_metrics: DetailMap,
}

impl GenerationMetric {
    /// Create a metric row for a finished attempt
    #[must_use]
    pub fn new(
        request_id: RequestId,
        agent_name: AgentName,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        status: MetricStatus,
    ) -> Self {
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            id: MetricId::new(),
            request_id,
            agent_name,
            step_number: agent_name.step_number(),
            started_at,
            completed_at,
            duration_ms,
            usage: None,
            status,
            error_message: None,
            agent_metrics: DetailMap::new(),
        }
    }

    /// With an error message
    #[inline]
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// With LLM usage
    #[inline]
    #[must_use]
    pub fn with_usage(mut self, usage: LlmUsageMetric) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Add one stage-specific counter
    #[inline]
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.agent_metrics.insert(key.into(), value);
        self
    }
}

/// One (request, requirement) coverage row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageAnalysis {
    /// Row id
    pub id: CoverageId,
    /// Owning request
    pub request_id: RequestId,
    /// Requirement text as submitted
    pub requirement_text: String,
    /// Index into the request's requirements
    pub requirement_index: usize,
    /// Whether at least one test covers the requirement
    pub is_covered: bool,
    /// Tests that cover the requirement
    pub covering_tests: Vec<TestCaseId>,
    /// `covering_tests.len()`
    pub coverage_count: usize,
    /// `min(1.0, coverage_count / 2.0)`
    pub coverage_score: f64,
    /// Uncovered, or covered by fewer than two tests
    pub has_gap: bool,
    /// Description when a gap exists
    pub gap_description: Option<String>,
}

/// One Safety Guard decision (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAuditLog {
    /// Row id
    pub id: AuditId,
    /// Owning request
    pub request_id: RequestId,
    /// Test the decision applies to, when per-test
    pub test_id: Option<TestCaseId>,
    /// Sub-layer that produced the finding
    pub security_layer: SecurityLayer,
    /// Risk contributed by this sub-layer
    pub risk_level: RiskLevel,
    /// Finding descriptions
    pub issues: Vec<String>,
    /// Patterns that matched, for the static layer
    pub blocked_patterns: Vec<String>,
    /// Disposition
    pub action_taken: ActionTaken,
    /// Sub-layer specific details
    pub details: DetailMap,
    /// Row creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_ordering() {
        assert!(RiskLevel::Safe < RiskLevel::Low);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert!(!RiskLevel::Medium.is_blocking());
        assert!(RiskLevel::High.is_blocking());
    }

    #[test]
    fn risk_level_wire_format() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }

    #[test]
    fn request_defaults() {
        let req = Request::new("https://example.com", vec!["login works".into()], TestType::Ui);
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.max_retries, 3);
        assert!(req.started_at.is_none());
    }

    #[test]
    fn test_case_hashes_canonical_source() {
        let req = RequestId::new();
        let a = TestCase::new(req, "test_login", "assert True  \n", CaseType::Automated);
        let b = TestCase::new(req, "test_login", "assert True\r\n", CaseType::Automated);
        assert_eq!(a.code_hash, b.code_hash);
        // code itself is preserved verbatim
        assert_eq!(a.code, "assert True  \n");
    }

    #[test]
    fn metadata_completeness() {
        let mut meta = TestMetadata::default();
        assert!(!meta.is_complete());
        meta.feature = Some("auth".into());
        meta.story = Some("login".into());
        meta.title = Some("login works".into());
        assert!(!meta.is_complete());
        meta.severity = Some("critical".into());
        assert!(meta.is_complete());
    }

    #[test]
    fn metric_duration_from_timestamps() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(1500);
        let metric = GenerationMetric::new(
            RequestId::new(),
            AgentName::Generator,
            start,
            end,
            MetricStatus::Success,
        );
        assert_eq!(metric.duration_ms, 1500);
        assert_eq!(metric.step_number, 2);
    }

    #[test]
    fn agent_name_stage_mapping() {
        assert_eq!(AgentName::Reconnaissance.step_number(), 1);
        assert_eq!(
            AgentName::Optimizer.running_status(),
            RequestStatus::Optimization
        );
    }

    #[test]
    fn exportable_excludes_failed_and_duplicates() {
        let mut t = TestCase::new(RequestId::new(), "t", "assert True", CaseType::Automated);
        assert!(t.is_exportable());
        t.validation_status = ValidationStatus::Failed;
        assert!(!t.is_exportable());
        t.validation_status = ValidationStatus::Passed;
        t.is_duplicate = true;
        assert!(!t.is_exportable());
    }
}
