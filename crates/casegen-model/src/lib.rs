//! CaseGen data model
//!
//! Foundation crate for the test-case generation pipeline: typed ids,
//! content hashes, the request status state machine, and the five persisted
//! row types.
//!
//! # Ownership
//!
//! ```text
//! Request 1--* TestCase
//!         1--* GenerationMetric   (append-only)
//!         1--* CoverageAnalysis   (replaced per optimization run)
//!         1--* SecurityAuditLog   (append-only)
//! ```
//!
//! Deleting a request cascades to every owned row.

pub mod entities;
pub mod error;
pub mod hash;
pub mod ids;
pub mod status;

pub use entities::{
    ActionTaken, AgentName, CaseType, CoverageAnalysis, DetailMap, GenerationMetric, IssueLayer,
    IssueSeverity, LlmUsageMetric, MetricStatus, Request, RiskLevel, SecurityAuditLog, SecurityLayer,
    TestCase, TestMetadata, TestType, ValidationIssue, ValidationStatus,
};
pub use error::{ErrorCode, ErrorKind};
pub use hash::{canonicalize_source, CodeHash, HashError};
pub use ids::{AuditId, CheckpointId, CoverageId, MetricId, RequestId, TestCaseId};
pub use status::{allowed_transitions, validate_transition, RequestStatus, TransitionError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
