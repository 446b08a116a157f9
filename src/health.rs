use crate::clienv::{PLUGIN_NAME, PLUGIN_VERSION};
use crate::license::{LicenseSnapshot, LicenseStatus};
use crate::state::PluginState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};

/// Resident memory above which the plugin reports itself unhealthy.
pub const MEMORY_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

/// Memory usage of the current process, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessMemory {
    pub rss: u64,
    #[serde(rename = "virtual")]
    pub virtual_bytes: u64,
}

impl ProcessMemory {
    /// `None` when the platform does not expose process statistics.
    pub fn current() -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;
        Some(Self {
            rss: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }
}

/// Checks that inspect the host rather than plugin state. Gathering them
/// blocks (process table refresh, `PATH` scan), so it happens before any
/// shared state is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostChecks {
    pub memory: bool,
    pub probe_command: bool,
}

impl HostChecks {
    pub fn gather(probe_program: &str) -> Self {
        Self {
            memory: ProcessMemory::current()
                .map(|m| m.rss < MEMORY_LIMIT_BYTES)
                .unwrap_or(true),
            probe_command: which::which(probe_program).is_ok(),
        }
    }

    pub fn failed() -> Self {
        Self {
            memory: false,
            probe_command: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub uptime: bool,
    pub memory: bool,
    pub responsive: bool,
    pub probe_command: bool,
}

impl HealthChecks {
    pub fn all_pass(&self) -> bool {
        self.uptime && self.memory && self.responsive && self.probe_command
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseSummary {
    pub valid: bool,
    pub status: LicenseStatus,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub version: &'static str,
    pub service: &'static str,
    pub checks: HealthChecks,
    pub license: LicenseSummary,
}

impl HealthReport {
    pub fn collect(plugin: &PluginState, license: &LicenseSnapshot, host: HostChecks) -> Self {
        let checks = HealthChecks {
            uptime: plugin.started_at.elapsed() > Duration::ZERO,
            memory: host.memory,
            responsive: true,
            probe_command: host.probe_command,
        };

        Self::from_checks(plugin, license, checks)
    }

    pub fn from_checks(plugin: &PluginState, license: &LicenseSnapshot, checks: HealthChecks) -> Self {
        let status = if checks.all_pass() && plugin.healthy {
            "healthy"
        } else {
            "unhealthy"
        };

        Self {
            status,
            timestamp: Utc::now(),
            uptime: plugin.uptime_secs(),
            version: PLUGIN_VERSION,
            service: PLUGIN_NAME,
            checks,
            license: LicenseSummary {
                valid: license.valid,
                status: license.status.clone(),
            },
        }
    }

    /// Whether the HTTP status should be 200. License state does not count:
    /// an unlicensed plugin is still up and must stay reachable.
    pub fn is_healthy(&self) -> bool {
        self.checks.all_pass()
    }
}
