//! Configuration loading, validation, and management for ctxloom.
//!
//! Loads configuration from `~/.ctxloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use ctxloom_core::budget::{
    DEFAULT_TOKENIZER_ID, DEFAULT_TOKENIZER_VERSION, DEFAULT_TOTAL_BUDGET_TOKENS,
};
use ctxloom_core::{BudgetProfile, LayerBudget, LayerMap};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ctxloom/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capacity and cache limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Initial budget profile
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Inspect access policy
    #[serde(default)]
    pub inspect: InspectConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted input, in estimated tokens
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    /// Retrieved chunks kept per request
    #[serde(default = "default_max_retrieved_chunks")]
    pub max_retrieved_chunks: usize,

    /// In-flight requests allowed per (project, document)
    #[serde(default = "default_max_concurrent_by_document")]
    pub max_concurrent_by_document: usize,

    /// Stable-prefix cache entries kept before LRU eviction
    #[serde(default = "default_stable_prefix_cache_capacity")]
    pub stable_prefix_cache_capacity: usize,
}

fn default_max_input_tokens() -> usize {
    64_000
}
fn default_max_retrieved_chunks() -> usize {
    200
}
fn default_max_concurrent_by_document() -> usize {
    4
}
fn default_stable_prefix_cache_capacity() -> usize {
    4096
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: default_max_input_tokens(),
            max_retrieved_chunks: default_max_retrieved_chunks(),
            max_concurrent_by_document: default_max_concurrent_by_document(),
            stable_prefix_cache_capacity: default_stable_prefix_cache_capacity(),
        }
    }
}

/// Budget profile the engine starts from (version 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_tokenizer_id")]
    pub tokenizer_id: String,

    #[serde(default = "default_tokenizer_version")]
    pub tokenizer_version: String,

    #[serde(default = "default_total_budget_tokens")]
    pub total_budget_tokens: usize,

    #[serde(default = "default_budget_layers")]
    pub layers: LayerMap<LayerBudgetConfig>,
}

/// One layer's share, snake_case for TOML.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerBudgetConfig {
    pub ratio: f64,
    #[serde(default)]
    pub minimum_tokens: usize,
}

impl From<LayerBudget> for LayerBudgetConfig {
    fn from(budget: LayerBudget) -> Self {
        Self {
            ratio: budget.ratio,
            minimum_tokens: budget.minimum_tokens,
        }
    }
}

fn default_tokenizer_id() -> String {
    DEFAULT_TOKENIZER_ID.into()
}
fn default_tokenizer_version() -> String {
    DEFAULT_TOKENIZER_VERSION.into()
}
fn default_total_budget_tokens() -> usize {
    DEFAULT_TOTAL_BUDGET_TOKENS
}
fn default_budget_layers() -> LayerMap<LayerBudgetConfig> {
    BudgetProfile::default_layers().map(|_, b| b.into())
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            tokenizer_id: default_tokenizer_id(),
            tokenizer_version: default_tokenizer_version(),
            total_budget_tokens: default_total_budget_tokens(),
            layers: default_budget_layers(),
        }
    }
}

impl BudgetConfig {
    /// The version-1 profile described by this section.
    pub fn to_profile(&self) -> BudgetProfile {
        BudgetProfile {
            version: 1,
            tokenizer_id: self.tokenizer_id.clone(),
            tokenizer_version: self.tokenizer_version.clone(),
            total_budget_tokens: self.total_budget_tokens,
            layers: self
                .layers
                .clone()
                .map(|_, l| LayerBudget::new(l.ratio, l.minimum_tokens)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectConfig {
    /// Caller roles allowed to inspect layer content (case-insensitive)
    #[serde(default = "default_allowed_roles")]
    pub allowed_roles: Vec<String>,
}

fn default_allowed_roles() -> Vec<String> {
    vec!["owner".into(), "maintainer".into()]
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            allowed_roles: default_allowed_roles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ctxloom/config.toml).
    ///
    /// Environment overrides:
    /// - `CTXLOOM_MAX_INPUT_TOKENS`
    /// - `CTXLOOM_MAX_CONCURRENT_BY_DOCUMENT`
    /// - `CTXLOOM_LOG_FORMAT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("CTXLOOM_MAX_INPUT_TOKENS") {
            self.limits.max_input_tokens = parse_env("CTXLOOM_MAX_INPUT_TOKENS", &raw)?;
        }
        if let Some(raw) = lookup("CTXLOOM_MAX_CONCURRENT_BY_DOCUMENT") {
            self.limits.max_concurrent_by_document =
                parse_env("CTXLOOM_MAX_CONCURRENT_BY_DOCUMENT", &raw)?;
        }
        if let Some(format) = lookup("CTXLOOM_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ctxloom")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_input_tokens", self.limits.max_input_tokens),
            ("max_retrieved_chunks", self.limits.max_retrieved_chunks),
            (
                "max_concurrent_by_document",
                self.limits.max_concurrent_by_document,
            ),
            (
                "stable_prefix_cache_capacity",
                self.limits.stable_prefix_cache_capacity,
            ),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "limits.{name} must be > 0"
                )));
            }
        }

        if self.inspect.allowed_roles.iter().all(|r| r.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "inspect.allowed_roles must name at least one role".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be \"pretty\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }

        self.budget
            .to_profile()
            .check_shape()
            .map_err(|e| ConfigError::ValidationError(format!("budget: {e}")))?;

        Ok(())
    }

    /// Serialize the effective configuration (for the `config` command).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn parse_env(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} must be a positive integer")))
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
