use lime_core::{LimeError, Result, DEFAULT_GREETING};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod env_substitution;

pub use env_substitution::substitute_env_vars;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimeConfig {
    #[serde(default)]
    pub assistant: AssistantSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl LimeConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LimeError::ConfigError(format!("Failed to read config file: {}", e)))?;

        debug!("Loaded configuration from {:?}", path.as_ref());
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut value: serde_json::Value = if yaml.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|e| LimeError::ConfigError(format!("Failed to parse YAML: {}", e)))?
        };

        // Empty or comment-only documents mean "all defaults"
        if value.is_null() {
            value = serde_json::Value::Object(serde_json::Map::new());
        }

        substitute_env_vars(&mut value)?;

        let config: LimeConfig = serde_json::from_value(value)
            .map_err(|e| LimeError::ConfigError(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.assistant.model.trim().is_empty() {
            return Err(LimeError::ConfigError("Assistant model cannot be empty".into()));
        }
        if self.assistant.base_url.trim().is_empty() {
            return Err(LimeError::ConfigError("Assistant base_url cannot be empty".into()));
        }
        if self.assistant.timeout_secs == 0 {
            return Err(LimeError::ConfigError("timeout_secs must be greater than 0".into()));
        }
        if self.chat.greeting.trim().is_empty() {
            return Err(LimeError::ConfigError("Chat greeting cannot be empty".into()));
        }
        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        lime_home().join("config.yaml")
    }
}

impl AssistantSettings {
    /// The configured key, or `GEMINI_API_KEY` from the environment.
    pub fn api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env::var("GEMINI_API_KEY").ok().filter(|key| !key.trim().is_empty()))
            .ok_or_else(|| {
                LimeError::ConfigError(
                    "No assistant API key configured; set assistant.api_key or GEMINI_API_KEY".into(),
                )
            })
    }
}

impl StorageSettings {
    pub fn store_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| lime_home().join("store.json"))
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            image_model: default_image_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
        }
    }
}

/// Root directory for config and local data: `LIME_HOME`, else `~/.lime-ai`.
pub fn lime_home() -> PathBuf {
    env::var("LIME_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|p| p.join(".lime-ai"))
                .unwrap_or_else(|| PathBuf::from("./.lime-ai"))
        })
}

fn default_model() -> String { DEFAULT_MODEL.to_string() }
fn default_image_model() -> String { DEFAULT_IMAGE_MODEL.to_string() }
fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_timeout_secs() -> u64 { 60 }
fn default_greeting() -> String { DEFAULT_GREETING.to_string() }
