//! Configuration types and builders.
//!
//! Everything is read once at process start. Environment access goes through
//! a lookup function so the parsing rules can be exercised without touching
//! the process environment.

use crate::error::{ConfigError, Result};
use crate::llm::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Sample value shipped in `.env` templates; treated as unset.
const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Hosted model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    OpenRouter,
    Google,
}

impl ModelProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenRouter => "google/gemini-2.0-flash-001",
            Self::Google => "gemini-flash-latest",
        }
    }
}

/// Rate limiting for metered model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
        }
    }
}

/// Database connection configuration, handed to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            database: "gst_db".into(),
            username: "gst_user".into(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// `user@host:port/database`, safe to log.
    pub fn target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    pub fn new(provider: ModelProvider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: api_key.into(),
            temperature: 0.1,
            max_tokens: match provider {
                ModelProvider::OpenRouter => None,
                ModelProvider::Google => Some(2048),
            },
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Data directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub vector_store_path: PathBuf,
    pub rules_path: PathBuf,
}

impl PathsConfig {
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            vector_store_path: data_dir.join("vector_store"),
            rules_path: data_dir.join("gst_rules"),
            data_dir,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::from_data_dir("./data")
    }
}

/// Top-level assistant configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssistantConfig {
    pub rate_limit: RateLimitConfig,
    pub database: DatabaseConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    pub retry: RetryPolicy,
    pub paths: PathsConfig,
}

impl AssistantConfig {
    pub fn builder() -> AssistantConfigBuilder {
        AssistantConfigBuilder::default()
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::builder().from_env()?.build()
    }

    /// The model configuration, required by anything that calls the model.
    pub fn require_model(&self) -> std::result::Result<&ModelConfig, ConfigError> {
        self.model.as_ref().ok_or(ConfigError::MissingField(
            "OPENROUTER_API_KEY or GOOGLE_API_KEY".into(),
        ))
    }
}

/// Builder for AssistantConfig.
#[derive(Default)]
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_requests_per_minute(mut self, rate: u32) -> Self {
        self.config.rate_limit.max_requests_per_minute = rate;
        self
    }

    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.config.database = database;
        self
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.config.model = Some(model);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.config.paths = PathsConfig::from_data_dir(data_dir);
        self
    }

    /// Build from environment variables.
    pub fn from_env(self) -> Result<Self> {
        self.from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rate) = lookup("MAX_REQUESTS_PER_MINUTE") {
            self.config.rate_limit.max_requests_per_minute =
                parse_value("MAX_REQUESTS_PER_MINUTE", &rate)?;
        }

        let database = &mut self.config.database;
        if let Some(host) = lookup("MYSQL_HOST") {
            database.host = host;
        }
        if let Some(port) = lookup("MYSQL_PORT") {
            database.port = parse_value("MYSQL_PORT", &port)?;
        }
        if let Some(name) = lookup("MYSQL_DATABASE") {
            database.database = name;
        }
        if let Some(user) = lookup("MYSQL_USER") {
            database.username = user;
        }
        if let Some(password) = lookup("MYSQL_PASSWORD") {
            database.password = password;
        }

        let api_key = |name: &str| lookup(name).filter(|k| !k.is_empty() && k != PLACEHOLDER_API_KEY);
        if let Some(key) = api_key("OPENROUTER_API_KEY") {
            let mut model = ModelConfig::new(ModelProvider::OpenRouter, key);
            if let Some(name) = lookup("OPENROUTER_MODEL") {
                model = model.with_model(name);
            }
            self.config.model = Some(model);
        } else if let Some(key) = api_key("GOOGLE_API_KEY") {
            self.config.model = Some(ModelConfig::new(ModelProvider::Google, key));
        }

        if let Some(dir) = lookup("DATA_DIR") {
            self.config.paths = PathsConfig::from_data_dir(dir);
        }

        Ok(self)
    }

    pub fn build(self) -> Result<AssistantConfig> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.rate_limit.max_requests_per_minute == 0 {
            return Err(invalid(
                "MAX_REQUESTS_PER_MINUTE",
                "Rate limit must be greater than 0",
            )
            .into());
        }
        if self.config.database.host.is_empty() {
            return Err(ConfigError::MissingField("MYSQL_HOST".into()).into());
        }
        if self.config.database.database.is_empty() {
            return Err(ConfigError::MissingField("MYSQL_DATABASE".into()).into());
        }
        if self.config.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "At least one attempt is required").into());
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: impl Into<Cow<'static, str>>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn parse_value<T: FromStr>(field: &'static str, raw: &str) -> std::result::Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(field, format!("Cannot parse '{}'", raw)))
}
