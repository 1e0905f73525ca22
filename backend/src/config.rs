//! Configuration for the model gateway.

use std::time::Duration;

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Shared access token checked against the `PRIVATE-TOKEN` header.
///
/// When unset, the chat routes are open.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Dispatch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Admission capacity: dispatches allowed in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Longest accepted question, in characters.
    #[serde(default = "default_max_question_length")]
    pub max_length_of_question: usize,
    /// Timeout for a whole worker call, including the streamed body.
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Appended to the resolved worker address. Empty posts to the address itself.
    #[serde(default)]
    pub worker_path: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_length_of_question: default_max_question_length(),
            timeout_secs: default_chat_timeout(),
            max_retries: default_max_retries(),
            worker_path: String::new(),
        }
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Worker registry endpoints and the directory refresh schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub list_models_url: String,
    #[serde(default)]
    pub get_worker_address_url: String,
    #[serde(default)]
    pub refresh_all_workers_url: String,
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            list_models_url: String::new(),
            get_worker_address_url: String::new(),
            refresh_all_workers_url: String::new(),
            timeout_secs: default_registry_timeout(),
            max_retries: default_max_retries(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Optional HTTP moderation endpoint. Without a URL every text passes.
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_moderation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_moderation_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ModerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_concurrent() -> usize {
    100
}
fn default_max_question_length() -> usize {
    1000
}
fn default_chat_timeout() -> u64 {
    180
}
fn default_registry_timeout() -> u64 {
    1
}
fn default_moderation_timeout() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_refresh_interval() -> u64 {
    60
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (GATEWAY__SECTION__KEY format)
    /// 2. The file named by `GATEWAY_CONFIG`, or `config.{toml,yaml,json}` if present
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| "config".to_string());
        Self::load_from(&path)
    }

    /// Load configuration from the given file (extension optional) plus the environment.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let loaded = ConfigLoader::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = loaded.try_deserialize()?;
        config.set_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Replace zero values with defaults, the way absent values are treated.
    pub fn set_defaults(&mut self) {
        if self.chat.max_concurrent == 0 {
            self.chat.max_concurrent = default_max_concurrent();
        }
        if self.chat.max_length_of_question == 0 {
            self.chat.max_length_of_question = default_max_question_length();
        }
        if self.chat.timeout_secs == 0 {
            self.chat.timeout_secs = default_chat_timeout();
        }
        if self.registry.timeout_secs == 0 {
            self.registry.timeout_secs = default_registry_timeout();
        }
        if self.registry.refresh_interval_secs == 0 {
            self.registry.refresh_interval_secs = default_refresh_interval();
        }
        if self.moderation.timeout_secs == 0 {
            self.moderation.timeout_secs = default_moderation_timeout();
        }
        if self.auth.access_token.as_deref() == Some("") {
            self.auth.access_token = None;
        }
        if self.moderation.url.as_deref() == Some("") {
            self.moderation.url = None;
        }
    }

    /// Check that every required registry endpoint is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("registry.list_models_url", &self.registry.list_models_url),
            ("registry.get_worker_address_url", &self.registry.get_worker_address_url),
            ("registry.refresh_all_workers_url", &self.registry.refresh_all_workers_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }
}
