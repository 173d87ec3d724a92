//! OpenAPI endpoint input
//!
//! API-test requests carry a parsed endpoint list instead of a page
//! structure; the OpenAPI document parser itself is an external
//! collaborator.

use serde::{Deserialize, Serialize};

/// One endpoint to generate API tests for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    /// HTTP method, uppercase
    pub method: String,
    /// Path template (`/users/{id}`)
    pub path: String,
    /// Summary from the OpenAPI document
    pub summary: Option<String>,
    /// Parameter names in declaration order
    pub parameters: Vec<String>,
    /// Status codes the document declares
    pub response_codes: Vec<u16>,
}

impl ApiEndpoint {
    /// Create an endpoint with method and path only
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            summary: None,
            parameters: Vec::new(),
            response_codes: Vec::new(),
        }
    }

    /// Compact line used in generation prompts
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.summary {
            Some(summary) => format!("{} {} - {}", self.method, self.path, summary),
            None => format!("{} {}", self.method, self.path),
        }
    }
}
