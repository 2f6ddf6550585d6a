//! Tracing configuration

use serde::{Deserialize, Serialize};

/// Environment variable that disables tracing when truthy
pub const DISABLED_ENV: &str = "BATON_TRACING_DISABLED";

/// Environment variable controlling whether raw model and tool payloads are kept
pub const SENSITIVE_DATA_ENV: &str = "BATON_TRACE_INCLUDE_SENSITIVE_DATA";

/// Tracing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Record nothing; span operations become no-ops
    pub disabled: bool,
    /// Keep model input/output and tool arguments/results in span data
    pub include_sensitive_data: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            include_sensitive_data: true,
        }
    }
}

impl TracingConfig {
    /// Defaults overlaid with the `BATON_*` environment toggles
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(disabled) = lookup(DISABLED_ENV).as_deref().and_then(parse_flag) {
            config.disabled = disabled;
        }
        if let Some(sensitive) = lookup(SENSITIVE_DATA_ENV).as_deref().and_then(parse_flag) {
            config.include_sensitive_data = sensitive;
        }
        config
    }

    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
