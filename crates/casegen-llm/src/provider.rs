//! LLM provider interface and HTTP implementation
//!
//! The pipeline only ever talks to [`crate::CachedLlm`]; this module is the
//! uncached seam beneath it. [`HttpProvider`] speaks an OpenAI-compatible
//! chat/embeddings surface with client-credential token refresh.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::token::TokenHolder;

/// One chat-completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// System prompt
    pub system_prompt: String,
    /// User prompt
    pub user_prompt: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token budget
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Create a request with default sampling (temperature 0.2, 4096 tokens)
    #[must_use]
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: model.into(),
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    /// With sampling temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// With completion token budget
    #[inline]
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token usage reported by the upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
    /// Billed cost, when reported
    pub cost_usd: Option<f64>,
}

/// One chat-completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Completion text
    pub text: String,
    /// Model that answered
    pub model: String,
    /// Usage accounting
    pub usage: TokenUsage,
}

/// Uncached LLM operations
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform one chat completion
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Embed one text into a float vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Credentials for the client-credential token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEndpoint {
    /// Token endpoint URL
    pub url: String,
    /// Client id
    pub key_id: String,
    /// Client secret
    pub key_secret: String,
}

/// HTTP provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Chat-completions base URL (`{base}/chat/completions`)
    pub base_url: String,
    /// Embeddings endpoint; fallback embeddings are used when absent
    pub embeddings_url: Option<String>,
    /// Embedding model name sent to the embeddings endpoint
    pub embedding_model: String,
    /// Token endpoint; requests go unauthenticated when absent
    pub token: Option<TokenEndpoint>,
}

/// OpenAI-compatible HTTP provider
pub struct HttpProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    tokens: TokenHolder,
}

impl HttpProvider {
    /// Create a provider from configuration
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            tokens: TokenHolder::new(),
        }
    }

    /// Fetch a fresh access token from the token endpoint
    async fn fetch_token(&self) -> Result<(String, i64), LlmError> {
        let endpoint = self
            .config
            .token
            .as_ref()
            .ok_or(LlmError::NotConfigured("token"))?;

        let response = self
            .http
            .post(&endpoint.url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", endpoint.key_id.as_str()),
                ("client_secret", endpoint.key_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::MissingCredentials(format!(
                "token endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(LlmError::Status {
                code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let json: serde_json::Value = response.json().await?;
        let access_token = json["access_token"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("token response missing access_token".into()))?
            .to_string();
        let expires_in = json["expires_in"].as_i64().unwrap_or(3600);
        Ok((access_token, expires_in))
    }

    /// Bearer token for the next request, refreshed 5 minutes before expiry
    async fn bearer(&self) -> Result<Option<String>, LlmError> {
        if self.config.token.is_none() {
            return Ok(None);
        }
        let token = self.tokens.get_or_refresh(|| self.fetch_token()).await?;
        Ok(Some(token))
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let mut http_request = self.http.post(url).json(&body);
        if let Some(token) = self.bearer().await? {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(LlmError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".into()))?
            .to_string();
        let model = json["model"]
            .as_str()
            .unwrap_or(request.model.as_str())
            .to_string();
        let usage = TokenUsage {
            input_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: json["usage"]["total_tokens"].as_u64().unwrap_or(0),
            cost_usd: json["usage"]["cost_usd"].as_f64(),
        };

        Ok(ChatResponse { text, model, usage })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = self
            .config
            .embeddings_url
            .as_ref()
            .ok_or(LlmError::NotConfigured("embeddings"))?;

        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "input": text,
        });

        let mut http_request = self.http.post(url).json(&body);
        if let Some(token) = self.bearer().await? {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(LlmError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let vector: Vec<f32> = json["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("missing embedding array".into()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.is_empty() {
            return Err(LlmError::InvalidResponse("empty embedding".into()));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_builder() {
        let req = ChatRequest::new("system", "user", "gpt-test")
            .with_temperature(0.7)
            .with_max_tokens(256);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, 256);
    }

    #[tokio::test]
    async fn embed_without_endpoint_is_not_configured() {
        let provider = HttpProvider::new(ProviderConfig {
            base_url: "http://localhost:9".into(),
            embeddings_url: None,
            embedding_model: "embed-test".into(),
            token: None,
        });
        let err = provider.embed("text").await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured("embeddings")));
    }
}
