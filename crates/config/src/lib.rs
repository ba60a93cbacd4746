//! Configuration loading, validation, and management for LaBPrompT.
//!
//! Loads configuration from `~/.labprompt/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.labprompt/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generative-AI provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Backoff policy for transient provider failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Token allowance and usage tracking
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Hosted auth/database backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Master-prompt generation defaults
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// System-wide API key for the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Token allowance limits. A limit of 0 means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub max_tokens_per_call: u64,

    #[serde(default)]
    pub max_tokens_total: u64,

    #[serde(default)]
    pub max_calls: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens_per_call: 0,
            max_tokens_total: 0,
            max_calls: 0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Privileged key for user creation and plan bootstrapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_role_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,

    #[serde(default = "default_usage_table")]
    pub usage_table: String,

    #[serde(default = "default_plan")]
    pub default_plan: String,
}

fn default_usage_table() -> String {
    "api_usage".into()
}
fn default_plan() -> String {
    "free".into()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_role_key: None,
            anon_key: None,
            usage_table: default_usage_table(),
            default_plan: default_plan(),
        }
    }
}

impl BackendConfig {
    /// Both the URL and the service-role key are required for privileged calls.
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.service_role_key.is_some()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("service_role_key", &redact(&self.service_role_key))
            .field("anon_key", &redact(&self.anon_key))
            .field("usage_table", &self.usage_table)
            .field("default_plan", &self.default_plan)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum request body, in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Maximum decoded document size for analysis, in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,

    /// Requests per minute per client (0 = unlimited)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Turns kept per chat session; older turns are dropped (0 = unlimited)
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    20 * 1024 * 1024
}
fn default_max_document_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_rate_limit() -> usize {
    60
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".into(), "http://localhost:5173".into()]
}
fn default_max_sessions() -> usize {
    1_000
}
fn default_max_history() -> usize {
    50
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
            max_document_bytes: default_max_document_bytes(),
            rate_limit_per_minute: default_rate_limit(),
            allowed_origins: default_allowed_origins(),
            max_sessions: default_max_sessions(),
            max_history: default_max_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Target size used when a brief asks for 0 characters
    #[serde(default = "default_prompt_size")]
    pub default_prompt_size: usize,

    /// Requested sizes above this are clamped
    #[serde(default = "default_max_prompt_size")]
    pub max_prompt_size: usize,
}

fn default_prompt_size() -> usize {
    8_000
}
fn default_max_prompt_size() -> usize {
    50_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_prompt_size: default_prompt_size(),
            max_prompt_size: default_max_prompt_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.labprompt/config.toml).
    ///
    /// Environment variables override the file:
    /// - `LABPROMPT_API_KEY`, `GEMINI_API_KEY`, `GOOGLE_API_KEY` (in that order)
    /// - `LABPROMPT_MODEL`, `LABPROMPT_PORT`
    /// - `LABPROMPT_BACKEND_URL`, `LABPROMPT_SERVICE_ROLE_KEY`, `LABPROMPT_ANON_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = ["LABPROMPT_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"]
                .iter()
                .find_map(|key| lookup(key))
                .filter(|v| !v.is_empty());
        }

        if let Some(model) = lookup("LABPROMPT_MODEL") {
            self.provider.model = model;
        }

        if let Some(port) = lookup("LABPROMPT_PORT") {
            match port.parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid LABPROMPT_PORT"),
            }
        }

        if let Some(url) = lookup("LABPROMPT_BACKEND_URL") {
            self.backend.url = Some(url);
        }
        if let Some(key) = lookup("LABPROMPT_SERVICE_ROLE_KEY") {
            self.backend.service_role_key = Some(key);
        }
        if let Some(key) = lookup("LABPROMPT_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".labprompt")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_retries > 10 {
            return Err(ConfigError::ValidationError(
                "retry.max_retries must be at most 10".into(),
            ));
        }

        if self.generation.default_prompt_size == 0 || self.generation.max_prompt_size == 0 {
            return Err(ConfigError::ValidationError(
                "generation prompt sizes must be > 0".into(),
            ));
        }

        if self.generation.default_prompt_size > self.generation.max_prompt_size {
            return Err(ConfigError::ValidationError(
                "generation.default_prompt_size exceeds generation.max_prompt_size".into(),
            ));
        }

        Ok(())
    }

    /// Check if a provider API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
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
