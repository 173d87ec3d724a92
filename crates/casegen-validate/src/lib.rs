//! CaseGen validator
//!
//! Four-layer static classification of generated test sources:
//!
//! 1. **Syntax** - tree-sitter parse; failures skip every later layer
//! 2. **Semantic** - metadata decorators + assertion presence (warnings)
//! 3. **Logic** - unbounded loops, sleep-based waits (warnings)
//! 4. **Safety Guard** - static blacklist, AST import/builtin analysis,
//!    behavioral file access, optional sandbox seam
//!
//! Tests are classified independently and in parallel up to a bounded
//! fan-out; the batch result order always matches the input order.

pub mod ast;
pub mod error;
pub mod logic;
pub mod safety;
pub mod semantic;
pub mod validator;

pub use ast::{parse, ParsedSource};
pub use error::ValidateError;
pub use safety::{SafetyFinding, SafetyReport, SandboxAnalyzer};
pub use validator::{
    CandidateTest, TestValidation, ValidationLevel, Validator, ValidatorConfig,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
