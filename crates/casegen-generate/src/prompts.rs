//! Prompt assembly
//!
//! The generator emits pytest functions with allure decorators and
//! `# covers:` markers; the splitter and validator depend on exactly this
//! shape, so the instructions here are part of the crate contract.

use casegen_model::TestType;
use casegen_recon::{ApiEndpoint, PageStructure};

/// Target the generator works from
#[derive(Debug, Clone)]
pub enum GenerationTarget {
    /// Extracted web page structure
    Page(PageStructure),
    /// Parsed OpenAPI endpoint list
    Endpoints(Vec<ApiEndpoint>),
}

const COMMON_RULES: &str = "\
Rules:
- Output only Python code in a single ```python fenced block.
- Every test is one pytest function named test_*.
- Decorate every test with @allure.feature, @allure.story, @allure.title and @allure.severity.
- Every test contains at least one assert.
- Above each test add a comment `# covers: <i>[, <j>...]` listing the 0-based indices of the requirements it verifies.
- Repeat any imports a test needs before the first test function.
- Never use eval, exec, subprocess, os.system or raw sockets.";

/// System prompt for a test kind
#[must_use]
pub fn system_prompt(test_type: TestType) -> String {
    let role = match test_type {
        TestType::Ui => {
            "You are a senior QA engineer writing Playwright-based UI tests in Python."
        }
        TestType::Api => {
            "You are a senior QA engineer writing requests-based API tests in Python."
        }
        TestType::Manual => {
            "You are a senior QA engineer writing manual test procedures formatted as pytest skeletons."
        }
        TestType::Automated | TestType::Both => {
            "You are a senior QA engineer writing automated pytest tests in Python."
        }
    };
    format!("{role}\n{COMMON_RULES}")
}

/// User prompt from the target and requirements
#[must_use]
pub fn user_prompt(
    target: &GenerationTarget,
    requirements: &[String],
    regenerate: bool,
) -> String {
    let mut out = String::new();

    match target {
        GenerationTarget::Page(page) => {
            out.push_str("Generate tests for the following page.\n\n");
            out.push_str(&page.describe());
        }
        GenerationTarget::Endpoints(endpoints) => {
            out.push_str("Generate tests for the following API endpoints.\n\n");
            for endpoint in endpoints {
                out.push_str(&format!("- {}\n", endpoint.describe()));
            }
        }
    }

    out.push_str("\nRequirements:\n");
    for (index, requirement) in requirements.iter().enumerate() {
        out.push_str(&format!("{index}. {requirement}\n"));
    }
    out.push_str("\nCover every requirement with at least two distinct tests where feasible.\n");

    if regenerate {
        out.push_str(
            "\nThe previous attempt produced no parseable test functions. \
             Respond again and make sure the output is a single fenced Python \
             block containing complete test_* functions.\n",
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_mentions_required_decorators() {
        let prompt = system_prompt(TestType::Ui);
        assert!(prompt.contains("@allure.feature"));
        assert!(prompt.contains("# covers:"));
    }

    #[test]
    fn user_prompt_numbers_requirements() {
        let target = GenerationTarget::Page(PageStructure::new("https://example.com"));
        let prompt = user_prompt(
            &target,
            &["login works".to_string(), "logout works".to_string()],
            false,
        );
        assert!(prompt.contains("0. login works"));
        assert!(prompt.contains("1. logout works"));
        assert!(!prompt.contains("previous attempt"));
    }

    #[test]
    fn regeneration_alters_the_prompt() {
        let target = GenerationTarget::Endpoints(vec![ApiEndpoint::new("GET", "/health")]);
        let initial = user_prompt(&target, &[], false);
        let again = user_prompt(&target, &[], true);
        assert_ne!(initial, again);
        assert!(again.contains("previous attempt"));
    }
}
