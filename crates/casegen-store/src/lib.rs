//! CaseGen persistence adapter
//!
//! Row lifecycle for the five tables of the data model behind the [`Store`]
//! trait. [`MemoryStore`] is the reference implementation used by the worker
//! and the test suites; a database-backed store is an external collaborator
//! implementing the same trait.
//!
//! # Atomicity
//!
//! Status transitions and checkpoint writes travel in one [`RequestPatch`]
//! and commit together; metric and audit inserts are append-only and may
//! race safely.

pub mod error;
pub mod memory;
pub mod query;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::{Page, TestQuery};
pub use store::{RequestPatch, Store};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
