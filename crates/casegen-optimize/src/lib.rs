//! CaseGen optimizer
//!
//! Runs over the tests that survived validation: exact dedup on
//! canonicalized-source hashes, semantic dedup on embedding cosine
//! similarity, then requirements-coverage analysis. Insertion order
//! decides every tie; the result is a fixed point under re-runs.

pub mod coverage;
pub mod error;
pub mod exact;
pub mod optimizer;
pub mod semantic;

pub use coverage::{analyze, CoverageOutcome};
pub use error::OptimizeError;
pub use exact::{exact_dedup, DuplicateRecord};
pub use optimizer::{OptimizeOutcome, Optimizer, OptimizerConfig};
pub use semantic::semantic_dedup;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
