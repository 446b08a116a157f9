//! Reporting to the core orchestrator.
//!
//! The plugin registers once at startup and then pushes a small usage
//! snapshot every 30 seconds. Delivery is best effort: failures are logged
//! and the next tick tries again with fresh numbers.

use crate::clienv::{PLUGIN_ID, PLUGIN_NAME, PLUGIN_VERSION};
use crate::license::{LicenseManager, LicenseStatus};
use crate::state::SharedPluginState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default reporting interval
pub const REPORT_INTERVAL: Duration = Duration::from_secs(30);

const CORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_UPDATE_PATH: &str = "/api/health/update";
const REGISTER_PATH: &str = "/api/plugins/register";

/// Usage numbers pushed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    pub request_count: u64,
    pub error_count: u64,
    pub probe_count: usize,
    pub license_valid: bool,
    pub license_status: LicenseStatus,
}

impl TelemetrySnapshot {
    pub async fn capture(plugin: &SharedPluginState, license: &LicenseManager) -> Self {
        let license = license.status_snapshot().await;
        let plugin = plugin.read().await;
        Self {
            timestamp: Utc::now(),
            request_count: plugin.request_count,
            error_count: plugin.error_count,
            probe_count: plugin.probe_history.len(),
            license_valid: license.valid,
            license_status: license.status,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthUpdate<'a> {
    plugin_id: &'static str,
    status: &'static str,
    timestamp: DateTime<Utc>,
    metrics: &'a TelemetrySnapshot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration {
    plugin_id: &'static str,
    name: &'static str,
    version: &'static str,
    port: u16,
}

/// HTTP client for the core orchestrator.
#[derive(Clone)]
pub struct CoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoreClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(CORE_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn register(&self, port: u16) -> Result<(), reqwest::Error> {
        let body = Registration {
            plugin_id: PLUGIN_ID,
            name: PLUGIN_NAME,
            version: PLUGIN_VERSION,
            port,
        };
        self.client
            .post(format!("{}{}", self.base_url, REGISTER_PATH))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn report_health(
        &self,
        healthy: bool,
        snapshot: &TelemetrySnapshot,
    ) -> Result<(), reqwest::Error> {
        let body = HealthUpdate {
            plugin_id: PLUGIN_ID,
            status: if healthy { "healthy" } else { "unhealthy" },
            timestamp: Utc::now(),
            metrics: snapshot,
        };
        self.client
            .post(format!("{}{}", self.base_url, HEALTH_UPDATE_PATH))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Register with the orchestrator. Failure is expected when running
/// standalone and is only logged.
pub async fn register_with_core(core: &CoreClient, port: u16) {
    match core.register(port).await {
        Ok(()) => info!("Successfully registered with core system"),
        Err(e) => info!(
            "Failed to register with core system (this is normal when running standalone): {}",
            e
        ),
    }
}

/// Periodic health reporter
pub struct Reporter {
    core: CoreClient,
    plugin: SharedPluginState,
    license: Arc<LicenseManager>,
    interval: Duration,
}

impl Reporter {
    pub fn new(core: CoreClient, plugin: SharedPluginState, license: Arc<LicenseManager>) -> Self {
        Self {
            core,
            plugin,
            license,
            interval: REPORT_INTERVAL,
        }
    }

    /// Set the reporting interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Send one snapshot.
    pub async fn report_once(&self) -> Result<(), reqwest::Error> {
        let snapshot = TelemetrySnapshot::capture(&self.plugin, &self.license).await;
        let healthy = self.plugin.read().await.healthy;
        self.core.report_health(healthy, &snapshot).await
    }

    /// Run the reporting loop until `cancel` fires. The first report goes out
    /// one interval after start.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Core reporter started (interval: {:?})", self.interval);

        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.report_once().await {
                        Ok(()) => debug!("Successfully notified core system"),
                        Err(e) => warn!("Failed to notify core system: {}", e),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("Core reporter stopped");
                    break;
                }
            }
        }
    }

    /// Spawn [`Reporter::run`] as a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
