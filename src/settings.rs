//! Persisted settings
//!
//! Read-mostly process state loaded once at start. Writes happen only
//! through the configuration commands, never from the audit flow.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment override for the settings file location.
pub const CONFIG_PATH_VAR: &str = "AGENTAUDIT_CONFIG";
/// Environment override for the default model.
pub const MODEL_VAR: &str = "AGENTAUDIT_MODEL";
/// Environment override for the trust-registry base URL.
pub const REGISTRY_VAR: &str = "AGENTAUDIT_REGISTRY_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Provider key preferred when no model override is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,
    /// Default model, superseded by `AGENTAUDIT_MODEL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Trust-registry base URL, superseded by `AGENTAUDIT_REGISTRY_URL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
}

impl Settings {
    /// Load settings from disk; missing or malformed files fall back
    /// to defaults, then environment overrides apply.
    pub fn load() -> Self {
        let mut settings = settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|content| serde_json::from_str::<Settings>(&content).ok())
            .unwrap_or_default();

        if let Ok(model) = std::env::var(MODEL_VAR) {
            if !model.is_empty() {
                debug!(%model, "default model overridden from environment");
                settings.default_model = Some(model);
            }
        }
        if let Ok(registry) = std::env::var(REGISTRY_VAR) {
            if !registry.is_empty() {
                settings.registry_url = Some(registry);
            }
        }
        settings
    }
}

fn settings_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        return Some(PathBuf::from(path));
    }
    let home = std::env::var("HOME").ok()?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("agentaudit")
            .join("settings.json"),
    )
}
