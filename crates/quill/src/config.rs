//! Configuration loading and validation

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub model: ModelConfig,
    pub chat: ChatConfig,
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
                return Ok(config);
            }
        }
        Ok(Config::default())
    }

    /// Get the config directory path (~/.config/quill)
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("quill"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Get the data directory path (~/.quill) holding the token and conversations
    pub fn data_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".quill"))
    }

    /// Get the data directory, creating it if missing
    pub fn ensure_data_dir() -> Result<PathBuf> {
        let dir = Self::data_dir().context("Could not determine home directory")?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        Ok(dir)
    }
}

/// Auth server settings for the device-authorization flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL of the auth server
    pub server_url: String,
    /// OAuth client identifier sent with device-code requests
    pub client_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3005".to_string(),
            client_id: "quill-cli".to_string(),
        }
    }
}

/// Model API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model to use
    pub name: String,
    /// Base URL of the model API
    pub api_base: String,
    /// API key (falls back to the ANTHROPIC_API_KEY environment variable)
    pub api_key: Option<String>,
    /// Max tokens for responses
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "claude-sonnet-4-20250514".to_string(),
            api_base: "https://api.anthropic.com".to_string(),
            api_key: None,
            max_tokens: 8192,
        }
    }
}

/// Chat session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Character limit when displaying a tool result in the terminal
    pub tool_result_display_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            tool_result_display_limit: 200,
        }
    }
}
