//! CaseGen LLM layer
//!
//! The call-and-cache boundary between the pipeline and the model provider:
//!
//! ```text
//! stage -> CachedLlm -> LlmCache (TTL + single-flight)
//!                    -> LlmProvider (HTTP) -> TokenHolder
//!                    -> fallback embeddings (deterministic)
//! ```
//!
//! Cache keys fingerprint `(system_prompt, user_prompt, model)`; sampling
//! parameters are deliberately not part of the key.

pub mod cache;
pub mod client;
pub mod embedding;
pub mod error;
pub mod provider;
pub mod token;

pub use cache::LlmCache;
pub use client::{CacheOptions, CachedLlm, ChatOutcome, RetryPolicy};
pub use embedding::{cosine_similarity, fallback_embedding, l2_normalize, Embedder};
pub use error::LlmError;
pub use provider::{
    ChatRequest, ChatResponse, HttpProvider, LlmProvider, ProviderConfig, TokenEndpoint, TokenUsage,
};
pub use token::TokenHolder;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
