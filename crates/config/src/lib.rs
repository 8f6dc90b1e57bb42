//! Configuration loading, validation, and management for stylesmith.
//!
//! Loads configuration from `~/.stylesmith/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stylesmith_core::limits::{DEFAULT_MAX_CONVERSATION_TOKENS, DEFAULT_MAX_MESSAGE_TOKENS, SettingsProvider};

/// The root configuration structure.
///
/// Maps directly to `~/.stylesmith/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Replacement for the built-in instructions preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    /// Model transport settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Loop and memory bounds
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Where artifacts are kept
    #[serde(default)]
    pub storage: StorageConfig,
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
            .field("provider", &self.provider)
            .field("conversation", &self.conversation)
            .field("storage", &self.storage)
            .field("system_prompt_override", &self.system_prompt_override.is_some())
            .finish()
    }
}

/// OpenAI-compatible endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` is appended
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Conversation bounds. Sizes are in tokens (4 bytes each).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_max_message_tokens")]
    pub max_individual_message_size: u64,

    #[serde(default = "default_max_conversation_tokens")]
    pub max_conversation_size: u64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Tools whose failure ends the run
    #[serde(default = "default_critical_tools")]
    pub critical_tools: Vec<String>,
}

fn default_max_message_tokens() -> u64 {
    DEFAULT_MAX_MESSAGE_TOKENS
}
fn default_max_conversation_tokens() -> u64 {
    DEFAULT_MAX_CONVERSATION_TOKENS
}
fn default_max_iterations() -> u32 {
    10
}
fn default_critical_tools() -> Vec<String> {
    vec!["save_css".into(), "save_js".into()]
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_individual_message_size: default_max_message_tokens(),
            max_conversation_size: default_max_conversation_tokens(),
            max_iterations: default_max_iterations(),
            critical_tools: default_critical_tools(),
        }
    }
}

/// Artifact storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Root directory for the file backend
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}
fn default_storage_path() -> PathBuf {
    AppConfig::config_dir().join("artifacts")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stylesmith/config.toml).
    ///
    /// Also checks environment variables:
    /// - `STYLESMITH_API_KEY`, `OPENAI_API_KEY`, `OPENROUTER_API_KEY` (in that order)
    /// - `STYLESMITH_MODEL`
    /// - `STYLESMITH_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("STYLESMITH_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .filter(|k| !k.trim().is_empty());
        }

        if let Some(model) = lookup("STYLESMITH_MODEL") {
            self.provider.model = model;
        }

        if let Some(url) = lookup("STYLESMITH_API_URL") {
            self.provider.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stylesmith")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !self.provider.api_url.starts_with("http://") && !self.provider.api_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "provider.api_url must be an http(s) URL, got '{}'",
                self.provider.api_url
            )));
        }

        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("provider.model must not be empty".into()));
        }

        if self.conversation.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_iterations must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Write the default configuration to `path`, refusing to overwrite.
    pub fn write_default(path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::WriteError {
                path: path.to_path_buf(),
                reason: "file already exists (use --force to overwrite)".into(),
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl SettingsProvider for AppConfig {
    fn max_individual_message_size(&self) -> Option<u64> {
        Some(self.conversation.max_individual_message_size)
    }

    fn max_conversation_size(&self) -> Option<u64> {
        Some(self.conversation.max_conversation_size)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            conversation: ConversationConfig::default(),
            storage: StorageConfig::default(),
            system_prompt_override: None,
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

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },
}
