use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Document persisted between restarts. Only the license key survives;
/// validity is always re-established against the license manager.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    pub license_key: Option<String>,
}

/// Reads and writes [`PluginConfig`] at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// $COREBRIDGE_CONFIG_DIR/config.json or ~/.config/corebridge-ping/config.json
    pub fn from_env() -> Self {
        Self::new(crate::clienv::config_dir().join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<PluginConfig> {
        tracing::trace!(path = %self.path.display(), "Loading plugin config");

        if !self.path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(PluginConfig::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config from {}", self.path.display()))?;

        let config: PluginConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", self.path.display()))?;

        tracing::trace!(has_key = config.license_key.is_some(), "Plugin config loaded");
        Ok(config)
    }

    /// Rewrites the whole document. The new content lands in a sibling temp
    /// file first and is renamed over the old one, so a crash mid-write never
    /// leaves a truncated config behind.
    pub fn save(&self, config: &PluginConfig) -> Result<()> {
        tracing::trace!(path = %self.path.display(), "Saving plugin config");

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write config to {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace config at {}", self.path.display()))?;

        tracing::trace!("Plugin config saved");
        Ok(())
    }
}
