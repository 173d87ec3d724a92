//! Validator
//!
//! Classifies each generated test independently: syntax, semantic, logic,
//! then the Safety Guard. The first hard block short-circuits. Batches run
//! under a bounded fan-out and results always come back in input order.

use std::sync::Arc;
use std::time::Duration;

use casegen_model::{
    ActionTaken, CodeHash, IssueLayer, IssueSeverity, RiskLevel, TestMetadata, ValidationIssue,
    ValidationStatus,
};
use futures::stream::{self, StreamExt};

use crate::ast;
use crate::error::ValidateError;
use crate::logic;
use crate::safety::{self, SafetyFinding, SandboxAnalyzer};
use crate::semantic;

/// How deep a standalone validation call goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Parse only
    Syntax,
    /// Parse + metadata/assertion checks
    Semantic,
    /// All four layers
    Full,
}

/// One test source to validate
#[derive(Debug, Clone)]
pub struct CandidateTest {
    /// Function name
    pub name: String,
    /// Source text
    pub code: String,
}

impl CandidateTest {
    /// Create a candidate
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// Validator configuration
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    /// Concurrent per-test validations
    pub fanout: usize,
    /// Deadline for one test (matters once a sandbox analyzer is attached)
    pub per_test_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            fanout: 8,
            per_test_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of validating one test
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TestValidation {
    /// Function name
    pub name: String,
    /// Final status
    pub status: ValidationStatus,
    /// 0..=100 quality score
    pub score: i32,
    /// Maximum safety contribution
    pub risk: RiskLevel,
    /// Ordered findings across layers
    pub issues: Vec<ValidationIssue>,
    /// Extracted metadata tags
    pub metadata: TestMetadata,
    /// Parse-tree fingerprint (absent when the source did not parse)
    pub ast_hash: Option<CodeHash>,
    /// Safety sub-layer findings, one audit row each
    pub safety_findings: Vec<SafetyFinding>,
    /// Overall disposition
    pub action: ActionTaken,
}

/// Four-layer validator
pub struct Validator {
    config: ValidatorConfig,
    sandbox: Option<Arc<dyn SandboxAnalyzer>>,
}

impl Validator {
    /// Validator with default config and no sandbox
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default())
    }

    /// Validator with explicit config
    #[must_use]
    pub fn with_config(config: ValidatorConfig) -> Self {
        Self {
            config,
            sandbox: None,
        }
    }

    /// Attach an external sandbox analyzer
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxAnalyzer>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Validate one test at a level
    ///
    /// # Errors
    /// Only machinery failures (grammar load, sandbox transport) error;
    /// findings about the test land in the result.
    pub async fn validate_one(
        &self,
        test: &CandidateTest,
        level: ValidationLevel,
    ) -> Result<TestValidation, ValidateError> {
        let parsed = ast::parse(&test.code)?;

        // Layer 1: syntax. A parse failure records the issue and skips
        // every later layer.
        if parsed.syntax_errors > 0 {
            let issue = ValidationIssue::new(
                IssueLayer::Syntax,
                IssueSeverity::Error,
                "syntax_error",
                format!("{} parse error(s)", parsed.syntax_errors),
            );
            return Ok(TestValidation {
                name: test.name.clone(),
                status: ValidationStatus::Warning,
                score: 0,
                risk: RiskLevel::Safe,
                issues: vec![issue],
                metadata: TestMetadata::default(),
                ast_hash: None,
                safety_findings: Vec::new(),
                action: ActionTaken::Warning,
            });
        }

        let ast_hash = Some(parsed.fingerprint);

        // Layer 2: semantic (warnings only).
        let semantic_report = if level == ValidationLevel::Syntax {
            None
        } else {
            Some(semantic::check(&test.code, &parsed))
        };

        // Layer 3: logic (warnings only).
        let logic_issues = if level == ValidationLevel::Full {
            logic::check(&parsed)
        } else {
            Vec::new()
        };

        // Layer 4: safety guard.
        let safety_report = if level == ValidationLevel::Full {
            safety::scan(&test.code, &parsed, self.sandbox.as_deref()).await?
        } else {
            safety::SafetyReport::clean()
        };

        let metadata = semantic_report
            .as_ref()
            .map(|r| r.metadata.clone())
            .unwrap_or_default();
        let semantic_issues = semantic_report.map(|r| r.issues).unwrap_or_default();

        let semantic_count = semantic_issues.len() as i32;
        let logic_count = logic_issues.len() as i32;

        let mut issues = semantic_issues;
        issues.extend(logic_issues);
        for finding in &safety_report.findings {
            for description in &finding.issues {
                issues.push(ValidationIssue::new(
                    IssueLayer::Safety,
                    if finding.risk.is_blocking() {
                        IssueSeverity::Error
                    } else {
                        IssueSeverity::Warning
                    },
                    "safety_finding",
                    description.clone(),
                ));
            }
        }

        let mut score = (100 - 30 * semantic_count - 20 * logic_count).max(0);
        if safety_report.risk.is_blocking() {
            score = 0;
        }

        let status = if safety_report.risk.is_blocking() {
            ValidationStatus::Failed
        } else if metadata.is_complete() || score >= 50 {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Warning
        };

        let action = if safety_report.risk.is_blocking() {
            ActionTaken::Blocked
        } else if issues.is_empty() {
            ActionTaken::Allowed
        } else {
            ActionTaken::Warning
        };

        Ok(TestValidation {
            name: test.name.clone(),
            status,
            score,
            risk: safety_report.risk,
            issues,
            metadata,
            ast_hash,
            safety_findings: safety_report.findings,
            action,
        })
    }

    /// Validate a batch under the configured fan-out
    ///
    /// Results follow input order regardless of completion order. A test
    /// that exceeds the per-test deadline comes back as a warning with a
    /// `validation_timeout` issue; the batch itself never fails over one
    /// slow test.
    pub async fn validate_batch(
        &self,
        tests: Vec<CandidateTest>,
    ) -> Result<Vec<TestValidation>, ValidateError> {
        let fanout = self.config.fanout.max(1);
        let results: Vec<Result<TestValidation, ValidateError>> = stream::iter(
            tests.into_iter().map(|test| async move {
                match tokio::time::timeout(
                    self.config.per_test_timeout,
                    self.validate_one(&test, ValidationLevel::Full),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Ok(timed_out(&test)),
                }
            }),
        )
        .buffered(fanout)
        .collect()
        .await;

        results.into_iter().collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn timed_out(test: &CandidateTest) -> TestValidation {
    TestValidation {
        name: test.name.clone(),
        status: ValidationStatus::Warning,
        score: 0,
        risk: RiskLevel::Safe,
        issues: vec![ValidationIssue::new(
            IssueLayer::Safety,
            IssueSeverity::Warning,
            "validation_timeout",
            "validation exceeded the per-test deadline",
        )],
        metadata: TestMetadata::default(),
        ast_hash: None,
        safety_findings: Vec::new(),
        action: ActionTaken::Warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r##"
import allure

@allure.feature("auth")
@allure.story("login")
@allure.title("login works")
@allure.severity("critical")
def test_login(page):
    page.click("#login")
    assert page.url
"##;

    fn candidate(name: &str, code: &str) -> CandidateTest {
        CandidateTest::new(name, code)
    }

    #[tokio::test]
    async fn well_formed_test_passes() {
        let validator = Validator::new();
        let result = validator
            .validate_one(&candidate("test_login", GOOD), ValidationLevel::Full)
            .await
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Passed);
        assert_eq!(result.score, 100);
        assert_eq!(result.risk, RiskLevel::Safe);
        assert_eq!(result.action, ActionTaken::Allowed);
        assert!(result.ast_hash.is_some());
    }

    #[tokio::test]
    async fn syntax_failure_skips_later_layers() {
        let validator = Validator::new();
        // broken syntax AND an eval call; the eval must not be reported
        // because safety never runs on unparseable code
        let result = validator
            .validate_one(
                &candidate("test_broken", "def test_broken(:\n    eval('x')\n"),
                ValidationLevel::Full,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Warning);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].layer, IssueLayer::Syntax);
        assert!(result.ast_hash.is_none());
        assert!(result.safety_findings.is_empty());
    }

    #[tokio::test]
    async fn eval_blocks_the_test() {
        let validator = Validator::new();
        let result = validator
            .validate_one(
                &candidate("test_evil", "def test_evil():\n    eval(\"1+1\")\n    assert True\n"),
                ValidationLevel::Full,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Failed);
        assert_eq!(result.risk, RiskLevel::Critical);
        assert_eq!(result.score, 0);
        assert_eq!(result.action, ActionTaken::Blocked);
        assert_eq!(result.safety_findings.len(), 1);
    }

    #[tokio::test]
    async fn missing_metadata_yields_warning_status() {
        let validator = Validator::new();
        // no decorators at all: 4 semantic warnings push the score to 0
        let result = validator
            .validate_one(
                &candidate("test_bare", "def test_bare():\n    assert True\n"),
                ValidationLevel::Full,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Warning);
        assert!(result.score < 50);
        // warnings never escalate to failed
        assert_ne!(result.status, ValidationStatus::Failed);
    }

    #[tokio::test]
    async fn sleep_only_costs_twenty_points() {
        let validator = Validator::new();
        let code = r#"
import allure
import time

@allure.feature("auth")
@allure.story("login")
@allure.title("login works")
@allure.severity("normal")
def test_slow(page):
    time.sleep(2)
    assert page.url
"#;
        let result = validator
            .validate_one(&candidate("test_slow", code), ValidationLevel::Full)
            .await
            .unwrap();
        assert_eq!(result.score, 80);
        // complete metadata keeps it passing
        assert_eq!(result.status, ValidationStatus::Passed);
    }

    #[tokio::test]
    async fn syntax_level_skips_semantic_checks() {
        let validator = Validator::new();
        let result = validator
            .validate_one(
                &candidate("test_bare", "def test_bare():\n    x = 1\n"),
                ValidationLevel::Syntax,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Passed);
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn validator_is_deterministic() {
        let validator = Validator::new();
        let test = candidate("test_bare", "def test_bare():\n    x = 1\n");
        let first = validator
            .validate_one(&test, ValidationLevel::Full)
            .await
            .unwrap();
        let second = validator
            .validate_one(&test, ValidationLevel::Full)
            .await
            .unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.score, second.score);
        assert_eq!(first.risk, second.risk);
        assert_eq!(first.issues, second.issues);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let validator = Validator::new();
        let tests: Vec<CandidateTest> = (0..20)
            .map(|i| {
                candidate(
                    &format!("test_{i}"),
                    &format!("def test_{i}():\n    assert {i} == {i}\n"),
                )
            })
            .collect();

        let results = validator.validate_batch(tests).await.unwrap();
        let names: Vec<String> = results.iter().map(|r| r.name.clone()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("test_{i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn batch_never_rejects_the_whole_set() {
        let validator = Validator::new();
        let results = validator
            .validate_batch(vec![
                candidate("test_ok", GOOD),
                candidate("test_evil", "def test_evil():\n    eval(\"x\")\n"),
                candidate("test_broken", "def broken(:\n"),
            ])
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, ValidationStatus::Passed);
        assert_eq!(results[1].status, ValidationStatus::Failed);
        assert_eq!(results[2].status, ValidationStatus::Warning);
    }
}
