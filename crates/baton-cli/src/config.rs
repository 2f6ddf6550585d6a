//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable pointing at an alternative config file
pub const CONFIG_PATH_ENV: &str = "BATON_CONFIG_PATH";

/// Configuration for baton
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model used by every agent
    pub model: Option<String>,
    /// Root of an OpenAI-compatible API
    pub base_url: Option<String>,
    /// API key (prefer the OPENAI_API_KEY environment variable)
    pub api_key: Option<String>,
    /// Turn budget for each agent loop
    pub max_turns: Option<u32>,
    /// Print tokens and events as they arrive
    pub stream: Option<bool>,
    pub tracing: TracingSection,
}

/// `[tracing]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingSection {
    pub enabled: Option<bool>,
    /// Keep model and tool payloads in exported traces
    pub include_sensitive_data: Option<bool>,
    /// Append finished traces to this file as JSON lines
    pub trace_file: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("baton")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults on any problem
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some(baton_agent::DEFAULT_MODEL.to_string()),
            max_turns: Some(baton_agent::DEFAULT_MAX_TURNS),
            stream: Some(false),
            tracing: TracingSection {
                enabled: Some(true),
                include_sensitive_data: Some(true),
                trace_file: None,
            },
            ..Default::default()
        };

        default_config.save()?;
        Ok(path)
    }

    /// API key from the config file, then `OPENAI_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|key| std::env::var(key).ok())
    }

    fn api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| lookup("OPENAI_API_KEY"))
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# baton configuration file
# Place at ~/.config/baton/config.toml (Linux/Mac) or %APPDATA%\baton\config.toml (Windows)

# Model used by every agent
model = "gpt-4o-mini"

# OpenAI-compatible API root (optional)
# base_url = "http://localhost:11434/v1"

# API key (optional - OPENAI_API_KEY is used when unset)
# api_key = "sk-..."

# Turn budget for each agent loop
max_turns = 25

# Print tokens and events as they arrive
stream = false

[tracing]
enabled = true
# Set to false to redact model input/output and tool arguments/results
include_sensitive_data = true
# trace_file = "~/.local/share/baton/traces.jsonl"
"#
}
