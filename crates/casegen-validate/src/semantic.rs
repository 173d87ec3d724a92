//! Semantic layer
//!
//! Checks for the metadata decorators and assertion constructs the
//! generator is instructed to emit. Everything here is a warning; the
//! validator must not fail otherwise-passing tests over stylistic
//! omissions.

use casegen_model::{IssueLayer, IssueSeverity, TestMetadata, ValidationIssue};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::ParsedSource;

static DECORATOR_ARG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\(\s*["']([^"']+)["']"#).expect("valid regex"));
static PYTEST_MARK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pytest\.mark\.(\w+)").expect("valid regex"));

/// Result of the semantic layer
#[derive(Debug, Clone)]
pub struct SemanticReport {
    /// Warnings for missing metadata / assertions
    pub issues: Vec<ValidationIssue>,
    /// Extracted metadata tags
    pub metadata: TestMetadata,
    /// Whether at least one assertion-like construct was found
    pub has_assertion: bool,
}

fn decorator_arg(decorator: &str) -> Option<String> {
    DECORATOR_ARG_RE
        .captures(decorator)
        .map(|caps| caps[1].to_string())
        .or_else(|| {
            // severity is often passed as an enum member, not a string
            decorator
                .split_once('(')
                .map(|(_, rest)| rest.trim_end_matches(')').trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Extract metadata tags from decorator lines
#[must_use]
pub fn extract_metadata(parsed: &ParsedSource) -> TestMetadata {
    let mut metadata = TestMetadata::default();
    for decorator in &parsed.decorators {
        if decorator.starts_with("allure.feature") {
            metadata.feature = decorator_arg(decorator);
        } else if decorator.starts_with("allure.story") {
            metadata.story = decorator_arg(decorator);
        } else if decorator.starts_with("allure.title") {
            metadata.title = decorator_arg(decorator);
        } else if decorator.starts_with("allure.severity") {
            metadata.severity = decorator_arg(decorator);
        } else if decorator.starts_with("allure.tag") {
            if let Some(tag) = decorator_arg(decorator) {
                metadata.tags.push(tag);
            }
        } else if let Some(caps) = PYTEST_MARK_RE.captures(decorator) {
            metadata.tags.push(caps[1].to_string());
        }
    }
    metadata
}

/// Run the semantic layer over a parsed test
#[must_use]
pub fn check(code: &str, parsed: &ParsedSource) -> SemanticReport {
    let metadata = extract_metadata(parsed);
    let mut issues = Vec::new();

    let mut warn = |code: &str, message: String| {
        issues.push(ValidationIssue::new(
            IssueLayer::Semantic,
            IssueSeverity::Warning,
            code,
            message,
        ));
    };

    if metadata.feature.is_none() {
        warn(
            "missing_feature_decorator",
            "no @allure.feature decorator".to_string(),
        );
    }
    if metadata.story.is_none() {
        warn(
            "missing_story_decorator",
            "no @allure.story decorator".to_string(),
        );
    }
    if metadata.title.is_none() {
        warn(
            "missing_title_decorator",
            "no @allure.title decorator".to_string(),
        );
    }
    if metadata.severity.is_none() && metadata.tags.is_empty() {
        warn(
            "missing_severity_decorator",
            "no @allure.severity decorator or tag".to_string(),
        );
    }

    let has_assertion = parsed.assert_count > 0
        || parsed.calls.iter().any(|c| c.starts_with("expect"))
        || code.contains(".should(");
    if !has_assertion {
        warn(
            "no_assertions",
            "test contains no assertion-like construct".to_string(),
        );
    }

    SemanticReport {
        issues,
        metadata,
        has_assertion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast;

    const DECORATED: &str = r#"
import allure

@allure.feature("auth")
@allure.story("login")
@allure.title("login works")
@allure.severity(allure.severity_level.CRITICAL)
def test_login():
    assert True
"#;

    #[test]
    fn complete_metadata_produces_no_issues() {
        let parsed = ast::parse(DECORATED).unwrap();
        let report = check(DECORATED, &parsed);
        assert!(report.issues.is_empty());
        assert!(report.metadata.is_complete());
        assert_eq!(report.metadata.feature.as_deref(), Some("auth"));
        assert_eq!(report.metadata.title.as_deref(), Some("login works"));
        assert_eq!(
            report.metadata.severity.as_deref(),
            Some("allure.severity_level.CRITICAL")
        );
    }

    #[test]
    fn bare_test_collects_warnings_only() {
        let code = "def test_bare():\n    x = 1\n";
        let parsed = ast::parse(code).unwrap();
        let report = check(code, &parsed);
        // feature, story, title, severity, assertions
        assert_eq!(report.issues.len(), 5);
        assert!(report
            .issues
            .iter()
            .all(|i| i.severity == IssueSeverity::Warning));
        assert!(!report.has_assertion);
    }

    #[test]
    fn pytest_marks_count_as_tags() {
        let code = "\
import pytest

@pytest.mark.smoke
def test_tagged():
    assert True
";
        let parsed = ast::parse(code).unwrap();
        let report = check(code, &parsed);
        assert_eq!(report.metadata.tags, vec!["smoke"]);
        // severity satisfied via tag; feature/story/title still missing
        assert_eq!(report.issues.len(), 3);
    }

    #[test]
    fn expect_calls_count_as_assertions() {
        let code = "def test_expect(page):\n    expect(page).to_have_title(\"Home\")\n";
        let parsed = ast::parse(code).unwrap();
        let report = check(code, &parsed);
        assert!(report.has_assertion);
    }
}
