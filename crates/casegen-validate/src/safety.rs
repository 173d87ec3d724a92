//! Safety Guard
//!
//! Static classification of untrusted generated code in four sub-layers:
//! regex blacklist over raw source, parse-tree import/builtin analysis,
//! behavioral file-access patterns, and an optional external sandbox. Each
//! sub-layer contributes a risk level; a test's overall risk is the maximum
//! contribution.

use async_trait::async_trait;
use casegen_model::{RiskLevel, SecurityLayer};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::ParsedSource;
use crate::error::ValidateError;

/// One sub-layer's contribution
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SafetyFinding {
    /// Sub-layer that produced the finding
    pub layer: SecurityLayer,
    /// Risk this sub-layer contributes
    pub risk: RiskLevel,
    /// Finding descriptions
    pub issues: Vec<String>,
    /// Matched patterns (static layer)
    pub blocked_patterns: Vec<String>,
}

/// Combined Safety Guard verdict for one test
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SafetyReport {
    /// Maximum contribution across sub-layers
    pub risk: RiskLevel,
    /// One entry per sub-layer that found something
    pub findings: Vec<SafetyFinding>,
}

impl SafetyReport {
    /// Report with no findings
    #[inline]
    #[must_use]
    pub fn clean() -> Self {
        Self {
            risk: RiskLevel::Safe,
            findings: Vec::new(),
        }
    }
}

/// External dynamic analyzer seam
///
/// No implementation ships here; when absent the sandbox sub-layer
/// contributes nothing.
#[async_trait]
pub trait SandboxAnalyzer: Send + Sync {
    /// Analyze one source; `None` means no finding
    async fn analyze(&self, code: &str) -> Result<Option<SafetyFinding>, ValidateError>;
}

/// Dangerous primitives that block a test outright, wherever they appear
static STATIC_BLACKLIST: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\beval\s*\(", "eval("),
        (r"\bexec\s*\(", "exec("),
        (r"\bcompile\s*\(", "compile("),
        (r"__import__\s*\(", "__import__("),
        (r"\bimportlib\b", "importlib"),
        (r"os\.system\s*\(", "os.system("),
        (r"\bsubprocess\b", "subprocess"),
        (r"os\.popen\s*\(", "os.popen("),
        (r"os\.spawn\w*\s*\(", "os.spawn*("),
        (r"\bsocket\.socket\s*\(", "socket.socket("),
        (r"^\s*import\s+socket\b", "import socket"),
    ]
    .iter()
    .map(|(pattern, label)| {
        (
            Regex::new(&format!("(?m){pattern}")).expect("valid regex"),
            *label,
        )
    })
    .collect()
});

/// Modules a generated test is allowed to import
static IMPORT_WHITELIST: &[&str] = &[
    "pytest",
    "allure",
    "requests",
    "playwright",
    "selenium",
    "json",
    "re",
    "time",
    "datetime",
    "typing",
    "unittest",
    "uuid",
    "random",
    "string",
    "math",
    "dataclasses",
    "enum",
    "abc",
    "collections",
    "urllib",
    "http",
];

/// Builtins whose invocation blocks a test
static BUILTIN_BLACKLIST: &[&str] = &["eval", "exec", "compile", "__import__", "globals", "locals"];

static FILE_WRITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bopen\s*\([^)]*,\s*["'][wax]b?\+?["']"#).expect("valid regex")
});
static FILE_DELETE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(os\.(remove|unlink|rmdir)|shutil\.rmtree)\s*\(").expect("valid regex")
});

/// Static sub-layer: regex blacklist over the raw source
///
/// Any match is CRITICAL.
#[must_use]
pub fn static_scan(code: &str) -> Option<SafetyFinding> {
    let mut matched = Vec::new();
    for (regex, label) in STATIC_BLACKLIST.iter() {
        if regex.is_match(code) {
            matched.push((*label).to_string());
        }
    }
    if matched.is_empty() {
        return None;
    }
    Some(SafetyFinding {
        layer: SecurityLayer::Static,
        risk: RiskLevel::Critical,
        issues: matched
            .iter()
            .map(|p| format!("blacklisted pattern: {p}"))
            .collect(),
        blocked_patterns: matched,
    })
}

/// AST sub-layer: import whitelist (HIGH) and builtin blacklist (CRITICAL)
#[must_use]
pub fn ast_scan(parsed: &ParsedSource) -> Option<SafetyFinding> {
    let mut issues = Vec::new();
    let mut risk = RiskLevel::Safe;

    for import in &parsed.imports {
        if !IMPORT_WHITELIST.contains(&import.as_str()) {
            issues.push(format!("import outside whitelist: {import}"));
            risk = risk.max(RiskLevel::High);
        }
    }
    for call in &parsed.calls {
        if BUILTIN_BLACKLIST.contains(&call.as_str()) {
            issues.push(format!("blacklisted builtin call: {call}"));
            risk = risk.max(RiskLevel::Critical);
        }
    }

    if issues.is_empty() {
        return None;
    }
    Some(SafetyFinding {
        layer: SecurityLayer::Ast,
        risk,
        issues,
        blocked_patterns: Vec::new(),
    })
}

/// Behavioral sub-layer: file-write and file-delete patterns (MEDIUM)
#[must_use]
pub fn behavioral_scan(code: &str) -> Option<SafetyFinding> {
    let mut issues = Vec::new();
    if FILE_WRITE_RE.is_match(code) {
        issues.push("file write access".to_string());
    }
    if FILE_DELETE_RE.is_match(code) {
        issues.push("file delete access".to_string());
    }
    if issues.is_empty() {
        return None;
    }
    Some(SafetyFinding {
        layer: SecurityLayer::Behavioral,
        risk: RiskLevel::Medium,
        issues,
        blocked_patterns: Vec::new(),
    })
}

/// Run all sub-layers in order
///
/// Stops early once a sub-layer contributes a blocking risk; the overall
/// verdict cannot change past that point.
pub async fn scan(
    code: &str,
    parsed: &ParsedSource,
    sandbox: Option<&dyn SandboxAnalyzer>,
) -> Result<SafetyReport, ValidateError> {
    let mut report = SafetyReport::clean();

    let sub_layers = [static_scan(code), ast_scan(parsed), behavioral_scan(code)];
    for finding in sub_layers.into_iter().flatten() {
        report.risk = report.risk.max(finding.risk);
        report.findings.push(finding);
        if report.risk.is_blocking() {
            return Ok(report);
        }
    }

    if let Some(sandbox) = sandbox {
        if let Some(finding) = sandbox.analyze(code).await? {
            report.risk = report.risk.max(finding.risk);
            report.findings.push(finding);
        }
    }

    Ok(report)
}
