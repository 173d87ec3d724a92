//! Logic layer
//!
//! Flags constructs that make generated tests flaky or hang-prone:
//! unbounded loops and sleep-based synchronization. Warnings only.

use casegen_model::{IssueLayer, IssueSeverity, ValidationIssue};

use crate::ast::ParsedSource;

const SLEEP_CALLS: &[&str] = &["time.sleep", "sleep", "page.wait_for_timeout", "asyncio.sleep"];

/// Run the logic layer over a parsed test
#[must_use]
pub fn check(parsed: &ParsedSource) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if parsed.unbounded_loops > 0 {
        issues.push(ValidationIssue::new(
            IssueLayer::Logic,
            IssueSeverity::Warning,
            "unbounded_loop",
            format!(
                "{} `while True` loop(s) without break",
                parsed.unbounded_loops
            ),
        ));
    }

    let sleep_count = parsed
        .calls
        .iter()
        .filter(|call| SLEEP_CALLS.contains(&call.as_str()))
        .count();
    if sleep_count > 0 {
        issues.push(ValidationIssue::new(
            IssueLayer::Logic,
            IssueSeverity::Warning,
            "sleep_synchronization",
            format!("{sleep_count} sleep-based wait(s); prefer condition-based waits"),
        ));
    }

    issues
}
