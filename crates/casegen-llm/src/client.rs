//! Cached LLM call wrapper
//!
//! [`CachedLlm`] is the only LLM surface the pipeline stages see. It
//! fingerprints every chat call, serves repeats from a TTL cache with
//! single-flight miss handling, retries transient upstream failures with
//! exponential backoff, and falls back to deterministic embeddings when the
//! remote embedding endpoint is unavailable.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use casegen_model::CodeHash;
use sha2::{Digest, Sha256};

use crate::cache::LlmCache;
use crate::embedding::{fallback_embedding, l2_normalize, Embedder};
use crate::error::LlmError;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider};

/// Retry policy for transient upstream failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay; doubles per retry (1s, 2s, 4s by default)
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Cache and retry knobs for [`CachedLlm`]
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Max cached responses / embeddings
    pub capacity: u64,
    /// Entry time-to-live
    pub ttl: Duration,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// Transient-failure retry policy
    pub retry: RetryPolicy,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(3600),
            embedding_dim: 384,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one chat call through the wrapper
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The response, cached or fresh
    pub response: ChatResponse,
    /// Transient retries spent on this call (0 on cache hit)
    pub retries: u32,
    /// Whether the response came out of the cache
    pub cache_hit: bool,
}

/// Cached, retrying LLM client
pub struct CachedLlm {
    provider: Arc<dyn LlmProvider>,
    responses: LlmCache<ChatResponse>,
    embeddings: LlmCache<Vec<f32>>,
    embedding_dim: usize,
    retry: RetryPolicy,
}

impl CachedLlm {
    /// Create a wrapper with default options (1h TTL, 384-dim embeddings)
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_options(provider, CacheOptions::default())
    }

    /// Create a wrapper with explicit options
    #[must_use]
    pub fn with_options(provider: Arc<dyn LlmProvider>, options: CacheOptions) -> Self {
        Self {
            provider,
            responses: LlmCache::new(options.capacity, options.ttl),
            embeddings: LlmCache::new(options.capacity, options.ttl),
            embedding_dim: options.embedding_dim,
            retry: options.retry,
        }
    }

    /// Cache key: SHA-256 over system prompt, user prompt, and model
    ///
    /// Temperature and max_tokens are deliberately excluded; changing either
    /// does not invalidate cached entries within the TTL.
    #[must_use]
    pub fn cache_key(system_prompt: &str, user_prompt: &str, model: &str) -> CodeHash {
        let mut hasher = Sha256::new();
        hasher.update(system_prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(user_prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(model.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        CodeHash::new(bytes)
    }

    /// Perform one chat call
    ///
    /// With `use_cache` the response is served from the TTL cache when
    /// present; concurrent misses for one key share a single upstream call.
    /// Without it the upstream is always called and the cache refreshed.
    ///
    /// # Errors
    /// Transient failures are retried per the policy before surfacing.
    pub async fn call(
        &self,
        request: &ChatRequest,
        use_cache: bool,
    ) -> Result<ChatOutcome, LlmError> {
        let key = Self::cache_key(&request.system_prompt, &request.user_prompt, &request.model);
        let retries = Arc::new(AtomicU32::new(0));

        if use_cache {
            let executed = Arc::new(AtomicBool::new(false));
            let provider = Arc::clone(&self.provider);
            let request = request.clone();
            let policy = self.retry;
            let retries_in = Arc::clone(&retries);
            let executed_in = Arc::clone(&executed);

            let response = self
                .responses
                .try_get_with(key, async move {
                    executed_in.store(true, Ordering::SeqCst);
                    chat_with_retry(provider.as_ref(), &request, policy, &retries_in).await
                })
                .await
                .map_err(LlmError::shared)?;

            Ok(ChatOutcome {
                response,
                retries: retries.load(Ordering::SeqCst),
                cache_hit: !executed.load(Ordering::SeqCst),
            })
        } else {
            let response =
                chat_with_retry(self.provider.as_ref(), request, self.retry, &retries).await?;
            self.responses.insert(key, response.clone()).await;
            Ok(ChatOutcome {
                response,
                retries: retries.load(Ordering::SeqCst),
                cache_hit: false,
            })
        }
    }

    /// Embed one text, cached under SHA-256 of the text
    ///
    /// Falls back to the deterministic SHA-256-derived vector when the
    /// remote endpoint is unavailable or returns the wrong dimension, so
    /// dedup stays reproducible.
    pub async fn get_embedding(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let key = CodeHash::compute(text.as_bytes());
        let provider = Arc::clone(&self.provider);
        let policy = self.retry;
        let dim = self.embedding_dim;
        let text_owned = text.to_string();

        let vector = self
            .embeddings
            .get_with(key, async move {
                match embed_with_retry(provider.as_ref(), &text_owned, policy).await {
                    Ok(mut vector) if vector.len() == dim => {
                        l2_normalize(&mut vector);
                        vector
                    }
                    Ok(vector) => {
                        tracing::warn!(
                            got = vector.len(),
                            want = dim,
                            "embedding dimension mismatch, using deterministic fallback"
                        );
                        fallback_embedding(&text_owned, dim)
                    }
                    Err(error) => {
                        tracing::warn!(%error, "embedding endpoint unavailable, using deterministic fallback");
                        fallback_embedding(&text_owned, dim)
                    }
                }
            })
            .await;

        Ok(vector)
    }

    /// Configured embedding dimension
    #[inline]
    #[must_use]
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Approximate cached response count
    #[inline]
    #[must_use]
    pub fn cached_responses(&self) -> u64 {
        self.responses.entry_count()
    }
}

#[async_trait]
impl Embedder for CachedLlm {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.get_embedding(text).await
    }

    fn dim(&self) -> usize {
        self.embedding_dim
    }
}

async fn chat_with_retry(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    policy: RetryPolicy,
    retries: &AtomicU32,
) -> Result<ChatResponse, LlmError> {
    let mut delay = policy.base_delay;
    let mut attempt: u32 = 0;
    loop {
        match provider.chat(request).await {
            Ok(response) => return Ok(response),
            Err(error) if error.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                retries.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(attempt, %error, "transient llm failure, backing off");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn embed_with_retry(
    provider: &dyn LlmProvider,
    text: &str,
    policy: RetryPolicy,
) -> Result<Vec<f32>, LlmError> {
    let mut delay = policy.base_delay;
    let mut attempt: u32 = 0;
    loop {
        match provider.embed(text).await {
            Ok(vector) => return Ok(vector),
            Err(error) if error.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(attempt, %error, "transient embedding failure, backing off");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(error) => return Err(error),
        }
    }
}
