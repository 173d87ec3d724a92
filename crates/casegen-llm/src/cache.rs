//! Fingerprinted response cache
//!
//! Thin wrapper over a moka future cache keyed by [`CodeHash`]. Concurrent
//! misses for one key collapse into a single upstream evaluation: at most
//! one upstream call per (key, in-flight window).

use std::sync::Arc;
use std::time::Duration;

use casegen_model::CodeHash;
use moka::future::Cache;

/// TTL cache for LLM responses and embeddings
#[derive(Debug, Clone)]
pub struct LlmCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<CodeHash, V>,
}

impl<V: Clone + Send + Sync + 'static> LlmCache<V> {
    /// Create a cache with max capacity and time-to-live
    #[must_use]
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Get a cached value
    #[inline]
    pub async fn get(&self, key: &CodeHash) -> Option<V> {
        self.inner.get(key).await
    }

    /// Insert a value
    #[inline]
    pub async fn insert(&self, key: CodeHash, value: V) {
        self.inner.insert(key, value).await;
    }

    /// Get the cached value or resolve it through `init`
    ///
    /// Concurrent callers for the same key share one evaluation of `init`;
    /// errors are not cached.
    pub async fn try_get_with<E, Fut>(&self, key: CodeHash, init: Fut) -> Result<V, Arc<E>>
    where
        E: Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        self.inner.try_get_with(key, init).await
    }

    /// Get the cached value or compute it through an infallible `init`
    pub async fn get_with<Fut>(&self, key: CodeHash, init: Fut) -> V
    where
        Fut: std::future::Future<Output = V>,
    {
        self.inner.get_with(key, init).await
    }

    /// Drop one entry
    #[inline]
    pub async fn invalidate(&self, key: &CodeHash) {
        self.inner.invalidate(key).await;
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn insert_and_get() {
        let cache: LlmCache<String> = LlmCache::new(16, Duration::from_secs(60));
        let key = CodeHash::compute(b"prompt");
        cache.insert(key, "answer".to_string()).await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("answer"));
    }

    #[tokio::test]
    async fn try_get_with_single_evaluation() {
        let cache: LlmCache<String> = LlmCache::new(16, Duration::from_secs(60));
        let key = CodeHash::compute(b"prompt");
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: Result<String, Arc<std::io::Error>> = cache
                .try_get_with(key, async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("computed".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "computed");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_collapse() {
        let cache: LlmCache<u32> = LlmCache::new(16, Duration::from_secs(60));
        let key = CodeHash::compute(b"prompt");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                let value: Result<u32, Arc<std::io::Error>> = cache
                    .try_get_with(key, async move {
                        // widen the in-flight window
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    })
                    .await;
                value.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: LlmCache<String> = LlmCache::new(16, Duration::from_secs(60));
        let key = CodeHash::compute(b"prompt");

        let failed: Result<String, Arc<std::io::Error>> = cache
            .try_get_with(key, async {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            })
            .await;
        assert!(failed.is_err());

        let ok: Result<String, Arc<std::io::Error>> = cache
            .try_get_with(key, async { Ok("second try".to_string()) })
            .await;
        assert_eq!(ok.unwrap(), "second try");
    }
}
