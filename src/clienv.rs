use std::path::PathBuf;

/// Environment variables read by the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    Port,
    CoreApiUrl,
    LicenseManagerUrl,
    ConfigDir,
}

impl EnvVar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Port => "PORT",
            Self::CoreApiUrl => "CORE_API_URL",
            Self::LicenseManagerUrl => "LICENSE_MANAGER_URL",
            Self::ConfigDir => "COREBRIDGE_CONFIG_DIR",
        }
    }
}

pub const PLUGIN_ID: &str = "corebridge-ping";
pub const PLUGIN_NAME: &str = "CoreBridge Ping";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const PLUGIN_SUBDIR: &str = "corebridge-ping";
const DEFAULT_PORT: u16 = 3007;
const DEFAULT_CORE_API_URL: &str = "http://corebridge-core:4001";
const DEFAULT_LICENSE_MANAGER_URL: &str = "http://corebridge-license-manager:4002";

/// Non-empty value of an environment variable.
fn env_opt(var: EnvVar) -> Option<String> {
    std::env::var(var.as_str())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(var: EnvVar, default: &str) -> String {
    env_opt(var).unwrap_or_else(|| default.to_string())
}

/// HTTP listen port ($PORT or 3007)
pub fn port() -> u16 {
    let port = env_opt(EnvVar::Port)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    tracing::trace!(port = port, "Listen port");
    port
}

/// Core orchestrator base URL ($CORE_API_URL or default)
pub fn core_api_url() -> String {
    let url = env_or(EnvVar::CoreApiUrl, DEFAULT_CORE_API_URL);
    tracing::trace!(url = %url, "Core API URL");
    url
}

/// License manager base URL ($LICENSE_MANAGER_URL or default)
pub fn license_manager_url() -> String {
    let url = env_or(EnvVar::LicenseManagerUrl, DEFAULT_LICENSE_MANAGER_URL);
    tracing::trace!(url = %url, "License manager URL");
    url
}

/// Plugin config directory ($COREBRIDGE_CONFIG_DIR or ~/.config/corebridge-ping)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(EnvVar::ConfigDir)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
                .join(PLUGIN_SUBDIR)
        });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}
