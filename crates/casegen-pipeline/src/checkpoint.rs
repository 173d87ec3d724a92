//! Workflow checkpoint
//!
//! Durable per-request snapshot the orchestrator writes after every stage
//! and reloads on resume. The envelope is versioned: a blob written by
//! version V is readable by V and V+1.

use casegen_generate::RawTest;
use casegen_model::AgentName;
use casegen_recon::{ApiEndpoint, PageStructure};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Version this build writes
pub const CHECKPOINT_VERSION: u32 = 1;

/// Per-request workflow snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    /// Envelope version
    pub version: u32,
    /// Last stage whose output is fully persisted
    pub stage_completed: Option<AgentName>,
    /// Stage retries consumed so far
    pub retry_count: u32,
    /// Reconnaissance output (web requests)
    pub page: Option<PageStructure>,
    /// Endpoint list (API requests, set at ingest)
    pub endpoints: Option<Vec<ApiEndpoint>>,
    /// Generator output; dropped once tests are persisted as rows
    pub raw_tests: Option<Vec<RawTest>>,
}

impl Checkpoint {
    /// Fresh checkpoint for a new request
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            ..Self::default()
        }
    }

    /// Encode to the opaque blob the store persists
    #[must_use]
    pub fn encode(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "version": self.version }))
    }

    /// Decode a blob
    ///
    /// Accepts the current version and the previous one; anything else is
    /// [`PipelineError::CheckpointCorrupt`].
    pub fn decode(blob: serde_json::Value) -> Result<Self, PipelineError> {
        let checkpoint: Self = serde_json::from_value(blob)
            .map_err(|e| PipelineError::CheckpointCorrupt(e.to_string()))?;

        let oldest_readable = CHECKPOINT_VERSION.saturating_sub(1).max(1);
        if checkpoint.version < oldest_readable || checkpoint.version > CHECKPOINT_VERSION {
            return Err(PipelineError::CheckpointCorrupt(format!(
                "unsupported checkpoint version {} (readable: {}..={})",
                checkpoint.version, oldest_readable, CHECKPOINT_VERSION
            )));
        }
        Ok(checkpoint)
    }

    /// Stage the orchestrator should execute next, if any
    #[must_use]
    pub fn next_stage(&self) -> Option<AgentName> {
        match self.stage_completed {
            None => Some(AgentName::Reconnaissance),
            Some(AgentName::Reconnaissance) => Some(AgentName::Generator),
            Some(AgentName::Generator) => Some(AgentName::Validator),
            Some(AgentName::Validator) => Some(AgentName::Optimizer),
            Some(AgentName::Optimizer) => None,
        }
    }
}
