//! CaseGen pipeline
//!
//! The orchestration layer of the test-case generation service:
//!
//! ```text
//! ingest -> queue -> worker -> Orchestrator
//!                                recon -> generate -> validate -> optimize
//!                                  |          |           |           |
//!                               checkpoint + status (atomic), metric, event
//! ```
//!
//! The service facade exposes the operations an HTTP router calls; the
//! router, schema validation, and database driver remain external
//! collaborators behind the `Store`, `PageDriver`, and `LlmProvider`
//! seams.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod progress;
pub mod service;
pub mod worker;

pub use checkpoint::{Checkpoint, CHECKPOINT_VERSION};
pub use config::{CasegenConfig, ConfigError, LlmSettings, StageRetries, StageTimeouts};
pub use error::PipelineError;
pub use export::{ExportBundle, ExportFormat};
pub use orchestrator::Orchestrator;
pub use progress::{EventMetric, ProgressBus, ProgressEvent};
pub use service::{
    CasegenService, SubmitAccepted, SubmitApiRequest, SubmitRequest, TaskStatus,
};
pub use worker::{JobQueue, WorkerPool};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
