//! Configuration loading, validation, and management for SideChat.
//!
//! Loads configuration from `~/.sidechat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use sidechat_core::retention::RetentionPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.sidechat/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Branch/knowledge persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Age and count limits for merged knowledge
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Context composition settings
    #[serde(default)]
    pub composer: ComposerConfig,

    /// Summarization on merge
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory", "file" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// File or database path; defaults under the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Seconds between background retention sweeps (0 = never)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl StoreConfig {
    /// The configured path, or the backend's default location.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match self.backend.as_str() {
            "file" => AppConfig::config_dir().join("knowledge.jsonl"),
            _ => AppConfig::config_dir().join("sidechat.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Token budget used when the caller does not supply one
    #[serde(default = "default_token_budget")]
    pub default_token_budget: usize,

    /// Chunks requested from document retrieval
    #[serde(default = "default_document_top_k")]
    pub document_top_k: usize,

    /// Below this many remaining tokens, sections are dropped rather than
    /// truncated
    #[serde(default = "default_min_fragment_tokens")]
    pub min_fragment_tokens: usize,

    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,
}

fn default_token_budget() -> usize {
    2048
}
fn default_document_top_k() -> usize {
    5
}
fn default_min_fragment_tokens() -> usize {
    32
}
fn default_retrieval_timeout_ms() -> u64 {
    3000
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            default_token_budget: default_token_budget(),
            document_top_k: default_document_top_k(),
            min_fragment_tokens: default_min_fragment_tokens(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

impl ComposerConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// "llm" or "extractive"
    #[serde(default = "default_summarizer_mode")]
    pub mode: String,

    /// Hard upper bound on waiting for the summarizer
    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,

    /// Characters of the selected text kept by the extractive summary
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

fn default_summarizer_mode() -> String {
    "llm".into()
}
fn default_summarizer_timeout_secs() -> u64 {
    8
}
fn default_excerpt_chars() -> usize {
    200
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            mode: default_summarizer_mode(),
            timeout_secs: default_summarizer_timeout_secs(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sidechat/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `SIDECHAT_STORE_BACKEND`
    /// - `SIDECHAT_STORE_PATH`
    /// - `SIDECHAT_SUMMARIZER_MODE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("SIDECHAT_STORE_BACKEND") {
            self.store.backend = backend;
        }
        if let Some(path) = lookup("SIDECHAT_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }
        if let Some(mode) = lookup("SIDECHAT_SUMMARIZER_MODE") {
            self.summarizer.mode = mode;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sidechat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.store.backend.as_str(), "memory" | "file" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be one of memory, file, sqlite (got '{}')",
                self.store.backend
            )));
        }

        if !matches!(self.summarizer.mode.as_str(), "llm" | "extractive") {
            return Err(ConfigError::ValidationError(format!(
                "summarizer.mode must be llm or extractive (got '{}')",
                self.summarizer.mode
            )));
        }

        if self.summarizer.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "summarizer.timeout_secs must be > 0".into(),
            ));
        }

        if self.composer.retrieval_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "composer.retrieval_timeout_ms must be > 0".into(),
            ));
        }

        if self.retention.max_age_days == 0 {
            return Err(ConfigError::ValidationError(
                "retention.max_age_days must be > 0".into(),
            ));
        }

        if self.retention.max_cross_conversation == 0 {
            return Err(ConfigError::ValidationError(
                "retention.max_cross_conversation must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
