//! Testing utilities for the CaseGen workspace
//!
//! Scripted implementations of the two external-collaborator seams (LLM
//! provider and page driver) plus canned completions, shared by the crate
//! test suites.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use casegen_llm::{ChatRequest, ChatResponse, LlmError, LlmProvider, TokenUsage};
use casegen_recon::{ButtonElement, InputElement, PageDriver, PageStructure, ReconError};
use parking_lot::Mutex;

/// A completion with two well-formed login tests covering requirement 0
pub const LOGIN_COMPLETION: &str = r##"```python
import allure

# covers: 0
@allure.feature("auth")
@allure.story("login")
@allure.title("login works with valid credentials")
@allure.severity("critical")
def test_login_valid(page):
    page.fill("#username", "demo")
    page.fill("#password", "secret")
    page.click("[data-testid=\"signin\"]")
    assert "login works" in page.title()

# covers: 0
@allure.feature("auth")
@allure.story("login")
@allure.title("login works after retry")
@allure.severity("normal")
def test_login_retry(page):
    page.fill("#username", "demo")
    page.click("[data-testid=\"signin\"]")
    assert "login works" in page.title()
```"##;

/// A completion whose second test is byte-identical to the first
pub const DUPLICATE_COMPLETION: &str = r##"```python
import allure

@allure.feature("auth")
@allure.story("login")
@allure.title("login works")
@allure.severity("critical")
def test_login(page):
    page.click("#login")
    assert page.url

@allure.feature("auth")
@allure.story("login")
@allure.title("login works")
@allure.severity("critical")
def test_login(page):
    page.click("#login")
    assert page.url
```"##;

/// A completion containing a blocked `eval(` call
pub const UNSAFE_COMPLETION: &str = r##"```python
import allure

@allure.feature("auth")
@allure.story("login")
@allure.title("login works")
@allure.severity("critical")
def test_login_eval(page):
    eval("page.click('#login')")
    assert page.url

@allure.feature("auth")
@allure.story("login")
@allure.title("login form is visible")
@allure.severity("normal")
def test_login_visible(page):
    assert page.is_visible("#login")
```"##;

/// One scripted provider step
pub enum ScriptStep {
    /// Answer with this completion text
    Reply(String),
    /// Fail with an HTTP status
    Fail(u16),
}

/// LLM provider answering from a script, then repeating a default reply
///
/// Counts upstream calls so tests can assert cache and retry behavior.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptStep>>,
    default_reply: String,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_reply: LOGIN_COMPLETION.to_string(),
            calls: AtomicU32::new(0),
        }
    }

    /// Provider that always answers `reply`
    pub fn always(reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: reply.to_string(),
            calls: AtomicU32::new(0),
        }
    }

    /// Provider that fails `failures` times with 503, then answers `reply`
    pub fn flaky(failures: usize, reply: &str) -> Self {
        let mut script: Vec<ScriptStep> = (0..failures).map(|_| ScriptStep::Fail(503)).collect();
        script.push(ScriptStep::Reply(reply.to_string()));
        Self::new(script)
    }

    /// Upstream chat calls made so far
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front();
        match step {
            Some(ScriptStep::Fail(code)) => Err(LlmError::Status {
                code,
                body: "scripted failure".to_string(),
            }),
            Some(ScriptStep::Reply(text)) => Ok(ChatResponse {
                text,
                model: request.model.clone(),
                usage: TokenUsage {
                    input_tokens: 120,
                    output_tokens: 480,
                    total_tokens: 600,
                    cost_usd: Some(0.0042),
                },
            }),
            None => Ok(ChatResponse {
                text: self.default_reply.clone(),
                model: request.model.clone(),
                usage: TokenUsage {
                    input_tokens: 120,
                    output_tokens: 480,
                    total_tokens: 600,
                    cost_usd: Some(0.0042),
                },
            }),
        }
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        // force the deterministic fallback path
        Err(LlmError::NotConfigured("embeddings"))
    }
}

/// Canned login page
pub fn login_page(url: &str) -> PageStructure {
    let mut page = PageStructure::new(url);
    page.title = "Login".to_string();
    page.buttons.push(ButtonElement {
        text: "Sign in".to_string(),
        selector: "[data-testid=\"signin\"]".to_string(),
        visible: true,
    });
    page.inputs.push(InputElement {
        name: "username".to_string(),
        input_type: "text".to_string(),
        selector: "#username".to_string(),
        visible: true,
    });
    page.inputs.push(InputElement {
        name: "password".to_string(),
        input_type: "password".to_string(),
        selector: "#password".to_string(),
        visible: true,
    });
    page.selectors
        .insert("signin".to_string(), "[data-testid=\"signin\"]".to_string());
    page
}

/// Page driver returning a canned structure, optionally failing first
pub struct FixtureDriver {
    page: PageStructure,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FixtureDriver {
    pub fn new(page: PageStructure) -> Self {
        Self {
            page,
            failures_left: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Driver that times out `failures` times before succeeding
    pub fn flaky(page: PageStructure, failures: u32) -> Self {
        Self {
            page,
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageDriver for FixtureDriver {
    async fn extract(&self, _url: &str, timeout: Duration) -> Result<PageStructure, ReconError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ReconError::Timeout(timeout));
        }
        Ok(self.page.clone())
    }
}
