//! CaseGen generator
//!
//! Turns a reconnaissance target (page structure or endpoint list) plus
//! requirements into raw pytest sources, one string per test function.
//! All model access goes through the cached LLM wrapper.

pub mod generator;
pub mod prompts;
pub mod splitter;

pub use generator::{GenerateError, GenerationResult, Generator};
pub use prompts::GenerationTarget;
pub use splitter::{split_tests, RawTest};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
