//! Configuration loading, validation, and management for RigChat.
//!
//! Loads configuration from `~/.rigchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.rigchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider display name (used in logs and errors)
    #[serde(default = "default_provider_name")]
    pub provider_name: String,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Completion defaults and retry policy
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Moderation gate settings
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Session manager settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Knowledge retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Durable store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Cache tier settings
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider_name", &self.provider_name)
            .field("api_url", &self.api_url)
            .field("completion", &self.completion)
            .field("moderation", &self.moderation)
            .field("session", &self.session)
            .field("retrieval", &self.retrieval)
            .field("storage", &self.storage)
            .field("cache", &self.cache)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Attempts per completion (first call included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait before the second attempt; doubles for each further attempt
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on one whole turn
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_turn_timeout_secs() -> u64 {
    120
}

impl CompletionConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Longest accepted raw message, in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Case-insensitive terms that reject a message outright
    #[serde(default)]
    pub blocked_terms: Vec<String>,
}

fn default_max_message_length() -> usize {
    2000
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            blocked_terms: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Cap of the cached recent-history list
    #[serde(default = "default_history_cache_size")]
    pub history_cache_size: usize,

    /// History turns included in each prompt
    #[serde(default = "default_prompt_history_turns")]
    pub prompt_history_turns: usize,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_history_cache_size() -> usize {
    50
}
fn default_prompt_history_turns() -> usize {
    10
}

impl SessionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            history_cache_size: default_history_cache_size(),
            prompt_history_turns: default_prompt_history_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_limit")]
    pub limit: usize,

    /// Enable the embedding-similarity path next to lexical search
    #[serde(default)]
    pub semantic_search: bool,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_retrieval_limit() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_retrieval_limit(),
            semantic_search: false,
            similarity_threshold: default_similarity_threshold(),
            embedding_model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// SQLite database file. Defaults to `~/.rigchat/rigchat.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("rigchat.db"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "memory" or "none"
    #[serde(default = "default_cache_backend")]
    pub backend: String,
}

fn default_cache_backend() -> String {
    "memory".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.rigchat/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `RIGCHAT_API_KEY`, then `OPENAI_API_KEY`
    /// - `RIGCHAT_API_URL`
    /// - `RIGCHAT_MODEL`
    /// - `RIGCHAT_DATABASE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("RIGCHAT_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("RIGCHAT_API_URL") {
            self.api_url = url;
        }
        if let Ok(model) = std::env::var("RIGCHAT_MODEL") {
            self.completion.model = model;
        }
        if let Ok(db) = std::env::var("RIGCHAT_DATABASE") {
            self.storage.path = Some(PathBuf::from(db));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rigchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.completion;
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(ConfigError::ValidationError(
                "completion.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "completion.max_attempts must be at least 1".into(),
            ));
        }
        if self.moderation.max_message_length == 0 {
            return Err(ConfigError::ValidationError(
                "moderation.max_message_length must be > 0".into(),
            ));
        }
        if self.session.history_cache_size < self.session.prompt_history_turns {
            return Err(ConfigError::ValidationError(format!(
                "session.history_cache_size ({}) must be at least session.prompt_history_turns ({})",
                self.session.history_cache_size, self.session.prompt_history_turns
            )));
        }
        if self.retrieval.limit == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.limit must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if !matches!(self.storage.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage.backend '{}' (expected sqlite or memory)",
                self.storage.backend
            )));
        }
        if !matches!(self.cache.backend.as_str(), "memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "unknown cache.backend '{}' (expected memory or none)",
                self.cache.backend
            )));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider_name: default_provider_name(),
            api_url: default_api_url(),
            completion: CompletionConfig::default(),
            moderation: ModerationConfig::default(),
            session: SessionConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.completion.max_attempts, 3);
        assert_eq!(config.moderation.max_message_length, 2000);
        assert_eq!(config.session.prompt_history_turns, 10);
        assert!(!config.retrieval.semantic_search);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.completion.model, config.completion.model);
        assert_eq!(parsed.storage.backend, config.storage.backend);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.completion.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.storage.backend = "mongodb".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.completion.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn history_cache_smaller_than_prompt_history_rejected() {
        let mut config = AppConfig::default();
        config.session.history_cache_size = 4;
        config.session.prompt_history_turns = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("history_cache_size"));

        config.session.history_cache_size = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().provider_name, "openai");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_url = "http://localhost:11434/v1"

[moderation]
blocked_terms = ["crack windows"]

[retrieval]
semantic_search = true
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.api_url, "http://localhost:11434/v1");
        assert_eq!(config.moderation.blocked_terms, vec!["crack windows"]);
        assert_eq!(config.moderation.max_message_length, 2000);
        assert!(config.retrieval.semantic_search);
        assert_eq!(config.retrieval.limit, 5);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "completion = 42").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("[moderation]"));
    }
}
