//! Page driver seam

use std::time::Duration;

use async_trait::async_trait;

use crate::page::PageStructure;

/// Errors a driver can surface
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// Page did not finish loading within the deadline
    #[error("page load timed out after {0:?}")]
    Timeout(Duration),

    /// Driver could not reach the target
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Driver process / connection failure
    #[error("driver error: {0}")]
    Driver(String),
}

impl ReconError {
    /// Whether the failure is worth retrying
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Driver(_))
    }
}

/// Extracts a [`PageStructure`] from a URL
///
/// Implementations wrap a browser driver or a recorded fixture. The driver
/// honors `timeout` as an upper bound on the whole extraction.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Extract the structure of the page at `url`
    async fn extract(&self, url: &str, timeout: Duration) -> Result<PageStructure, ReconError>;
}
