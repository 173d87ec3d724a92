//! Pipeline configuration
//!
//! Defaults match production behavior; a TOML file and `CASEGEN_*`
//! environment variables override them. Credentials only ever come from the
//! environment or the file, never from code.

use serde::{Deserialize, Serialize};

/// Per-stage deadlines, seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    /// Reconnaissance deadline
    pub recon_s: u64,
    /// Generation deadline
    pub generation_s: u64,
    /// Validation deadline per test
    pub validation_per_test_s: u64,
    /// Validation deadline cap for the whole batch
    pub validation_cap_s: u64,
    /// Optimization deadline
    pub optimization_s: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            recon_s: 60,
            generation_s: 120,
            validation_per_test_s: 30,
            validation_cap_s: 300,
            optimization_s: 60,
        }
    }
}

/// Per-stage retry budgets
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StageRetries {
    /// Reconnaissance retries on driver/page timeout
    pub recon: u32,
    /// Generation retries on transient LLM failure
    pub generation: u32,
}

impl Default for StageRetries {
    fn default() -> Self {
        Self {
            recon: 2,
            generation: 3,
        }
    }
}

/// LLM endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Chat model identifier
    pub model: String,
    /// Chat-completions base URL
    pub base_url: String,
    /// Embeddings endpoint; deterministic fallback when absent
    pub embeddings_url: Option<String>,
    /// Embedding model identifier
    pub embedding_model: String,
    /// Token endpoint; unauthenticated when absent
    pub token_url: Option<String>,
    /// Client credential id
    pub key_id: Option<String>,
    /// Client credential secret
    pub key_secret: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            embeddings_url: None,
            embedding_model: "text-embedding-3-small".to_string(),
            token_url: None,
            key_id: None,
            key_secret: None,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasegenConfig {
    /// Database URL (the in-memory store ignores it)
    pub db_url: Option<String>,
    /// External queue URL (the in-process queue ignores it)
    pub queue_url: Option<String>,
    /// Concurrent request workers
    pub workers: usize,
    /// LLM cache TTL, seconds
    pub cache_ttl_s: u64,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// Cosine threshold for semantic duplicates
    pub similarity_threshold: f64,
    /// Concurrent per-test validations
    pub validator_fanout: usize,
    /// Stage deadlines
    pub stage_timeouts_s: StageTimeouts,
    /// Stage retry budgets
    pub max_retries: StageRetries,
    /// LLM endpoints and credentials
    pub llm: LlmSettings,
}

impl Default for CasegenConfig {
    fn default() -> Self {
        Self {
            db_url: None,
            queue_url: None,
            workers: 4,
            cache_ttl_s: 3600,
            embedding_dim: 384,
            similarity_threshold: 0.85,
            validator_fanout: 8,
            stage_timeouts_s: StageTimeouts::default(),
            max_retries: StageRetries::default(),
            llm: LlmSettings::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax error
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl CasegenConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(document)?)
    }

    /// Load from a TOML file, then apply environment overrides
    ///
    /// # Errors
    /// Propagates IO / parse errors; missing file is an error, a missing
    /// path argument falls back to defaults plus environment.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `CASEGEN_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("CASEGEN_DB_URL") {
            self.db_url = Some(value);
        }
        if let Ok(value) = std::env::var("CASEGEN_QUEUE_URL") {
            self.queue_url = Some(value);
        }
        if let Ok(value) = std::env::var("CASEGEN_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Ok(value) = std::env::var("CASEGEN_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Ok(value) = std::env::var("CASEGEN_LLM_KEY_ID") {
            self.llm.key_id = Some(value);
        }
        if let Ok(value) = std::env::var("CASEGEN_LLM_KEY_SECRET") {
            self.llm.key_secret = Some(value);
        }
        if let Ok(value) = std::env::var("CASEGEN_WORKERS") {
            if let Ok(parsed) = value.parse() {
                self.workers = parsed;
            }
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1".into()));
        }
        if self.validator_fanout == 0 {
            return Err(ConfigError::Invalid(
                "validator_fanout must be >= 1".into(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(ConfigError::Invalid("embedding_dim must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) || self.similarity_threshold == 0.0 {
            return Err(ConfigError::Invalid(
                "similarity_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = CasegenConfig::default();
        assert_eq!(config.cache_ttl_s, 3600);
        assert_eq!(config.embedding_dim, 384);
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.validator_fanout, 8);
        assert_eq!(config.stage_timeouts_s.recon_s, 60);
        assert_eq!(config.stage_timeouts_s.generation_s, 120);
        assert_eq!(config.max_retries.recon, 2);
        assert_eq!(config.max_retries.generation, 3);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CasegenConfig::from_toml(
            r#"
workers = 2
similarity_threshold = 0.9

[llm]
model = "local-model"
"#,
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.similarity_threshold, 0.9);
        assert_eq!(config.llm.model, "local-model");
        // untouched keys fall back
        assert_eq!(config.cache_ttl_s, 3600);
        assert_eq!(config.llm.embedding_model, "text-embedding-3-small");
    }

    #[test]
    fn load_reads_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casegen.toml");
        std::fs::write(&path, "workers = 3\ncache_ttl_s = 60\n").unwrap();

        let config = CasegenConfig::load(Some(&path)).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.cache_ttl_s, 60);

        let missing = CasegenConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = CasegenConfig::default();
        config.validator_fanout = 0;
        assert!(config.validate().is_err());

        let mut config = CasegenConfig::default();
        config.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
