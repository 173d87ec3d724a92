//! Access-token holder
//!
//! Keeps the current bearer token and refreshes it 5 minutes before expiry.
//! Refreshes are serialized so concurrent callers trigger at most one
//! upstream token request.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::error::LlmError;

/// Refresh margin before expiry
const REFRESH_MARGIN_SECS: i64 = 5 * 60;

#[derive(Debug, Clone)]
struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at - Utc::now() > Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

/// Cached access token with serialized refresh
#[derive(Debug, Default)]
pub struct TokenHolder {
    current: RwLock<Option<AccessToken>>,
    refresh_gate: Mutex<()>,
}

impl TokenHolder {
    /// Create an empty holder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current token, refreshing through `refresh` when it is absent
    /// or within 5 minutes of expiry
    ///
    /// `refresh` returns the new secret and its lifetime in seconds.
    ///
    /// # Errors
    /// Propagates the refresh error unchanged.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String, LlmError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(String, i64), LlmError>>,
    {
        if let Some(token) = self.current.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.secret.clone());
            }
        }

        let _gate = self.refresh_gate.lock().await;
        // another caller may have refreshed while we waited for the gate
        if let Some(token) = self.current.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.secret.clone());
            }
        }

        let (secret, expires_in) = refresh().await?;
        let token = AccessToken {
            secret: secret.clone(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        };
        tracing::debug!(expires_in, "access token refreshed");
        *self.current.write().await = Some(token);
        Ok(secret)
    }

    /// Drop the cached token so the next call refreshes
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn refreshes_once_and_reuses() {
        let holder = TokenHolder::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let token = holder
                .get_or_refresh(move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(("secret".to_string(), 3600))
                    }
                })
                .await
                .unwrap();
            assert_eq!(token, "secret");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_lived_token_is_refreshed() {
        let holder = TokenHolder::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            // expires inside the 5-minute refresh margin
            holder
                .get_or_refresh(move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(("short".to_string(), 60))
                    }
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let holder = TokenHolder::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            holder
                .get_or_refresh(move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(("secret".to_string(), 3600))
                    }
                })
                .await
                .unwrap();
            holder.invalidate().await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_error_propagates() {
        let holder = TokenHolder::new();
        let result = holder
            .get_or_refresh(|| async { Err(LlmError::MissingCredentials("bad key".into())) })
            .await;
        assert!(matches!(result, Err(LlmError::MissingCredentials(_))));
    }
}
