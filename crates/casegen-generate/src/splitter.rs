//! Raw output splitting
//!
//! Cuts the model's completion into one source string per test function.
//! A block starts at the first decorator of the run directly above a
//! `def test_*` line; import lines seen before the first block are repeated
//! on every test so each source stands alone.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*def\s+(test_\w+)\s*\(").expect("valid regex"));
static COVERS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\s*covers:\s*([0-9,\s]+)").expect("valid regex"));

/// One split test source, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTest {
    /// Function name
    pub name: String,
    /// Self-contained source
    pub code: String,
    /// Requirement indices declared via `# covers:` markers
    pub declared_coverage: Vec<usize>,
}

/// Split a completion into raw tests
#[must_use]
pub fn split_tests(raw: &str) -> Vec<RawTest> {
    let source = extract_code(raw);
    let lines: Vec<&str> = source.lines().collect();

    let mut starts: Vec<(usize, String)> = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if let Some(caps) = DEF_RE.captures(line) {
            let name = caps[1].to_string();
            let mut start = index;
            while start > 0 {
                let above = lines[start - 1].trim_start();
                if above.starts_with('@') || above.starts_with("# covers:") {
                    start -= 1;
                } else {
                    break;
                }
            }
            starts.push((start, name));
        }
    }

    if starts.is_empty() {
        return Vec::new();
    }

    let header_imports: Vec<&str> = lines[..starts[0].0]
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("import ") || t.starts_with("from ")
        })
        .copied()
        .collect();

    let mut tests = Vec::with_capacity(starts.len());
    for (position, (start, name)) in starts.iter().enumerate() {
        let end = starts
            .get(position + 1)
            .map_or(lines.len(), |(next, _)| *next);
        let mut block: Vec<&str> = lines[*start..end].to_vec();
        while block.last().is_some_and(|l| l.trim().is_empty()) {
            block.pop();
        }

        let body = block.join("\n");
        let code = if header_imports.is_empty() {
            body
        } else {
            format!("{}\n\n{}", header_imports.join("\n"), body)
        };

        tests.push(RawTest {
            name: name.clone(),
            declared_coverage: parse_covers(&code),
            code,
        });
    }
    tests
}

/// Content of fenced code blocks, or the raw text when none exist
fn extract_code(raw: &str) -> String {
    if !raw.contains("```") {
        return raw.to_string();
    }
    let mut in_fence = false;
    let mut collected: Vec<&str> = Vec::new();
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            collected.push(line);
        }
    }
    if collected.is_empty() {
        raw.to_string()
    } else {
        collected.join("\n")
    }
}

fn parse_covers(code: &str) -> Vec<usize> {
    let mut indices: Vec<usize> = COVERS_RE
        .captures_iter(code)
        .flat_map(|caps| {
            caps[1]
                .split(',')
                .filter_map(|part| part.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const COMPLETION: &str = r##"Here are the tests:

```python
import allure
import pytest

# covers: 0
@allure.feature("auth")
@allure.story("login")
@allure.title("login works")
@allure.severity("critical")
def test_login_success(page):
    page.fill("#username", "demo")
    page.click("[data-testid=\"signin\"]")
    assert page.url.endswith("/home")

# covers: 0, 1
@allure.feature("auth")
@allure.story("logout")
@allure.title("logout works")
@allure.severity("normal")
def test_logout(page):
    page.click("#logout")
    assert "login" in page.url
```
"##;

    #[test]
    fn splits_at_decorator_boundaries() {
        let tests = split_tests(COMPLETION);
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].name, "test_login_success");
        assert_eq!(tests[1].name, "test_logout");
        // each block keeps its decorators
        assert!(tests[0].code.contains("@allure.feature(\"auth\")"));
        assert!(tests[1].code.contains("@allure.story(\"logout\")"));
        // boundaries are clean: block one does not bleed into block two
        assert!(!tests[0].code.contains("test_logout"));
    }

    #[test]
    fn header_imports_are_repeated() {
        let tests = split_tests(COMPLETION);
        for test in &tests {
            assert!(test.code.contains("import allure"));
            assert!(test.code.contains("import pytest"));
        }
    }

    #[test]
    fn covers_markers_are_parsed() {
        let tests = split_tests(COMPLETION);
        assert_eq!(tests[0].declared_coverage, vec![0]);
        assert_eq!(tests[1].declared_coverage, vec![0, 1]);
    }

    #[test]
    fn unfenced_output_is_accepted() {
        let raw = "def test_plain():\n    assert True\n";
        let tests = split_tests(raw);
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name, "test_plain");
        assert!(tests[0].declared_coverage.is_empty());
    }

    #[test]
    fn prose_only_output_yields_nothing() {
        assert!(split_tests("I could not generate tests for this page.").is_empty());
    }

    #[test]
    fn helper_functions_are_not_boundaries() {
        let raw = "\
def make_user():
    return \"demo\"

def test_uses_helper():
    assert make_user() == \"demo\"
";
        let tests = split_tests(raw);
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name, "test_uses_helper");
    }
}
