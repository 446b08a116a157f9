//! Connectivity probing.
//!
//! A probe runs the system `ping` program against a single host and turns
//! whatever happens (exit status, timeout, captured text) into a
//! [`ProbeResult`]. Nothing in here returns an error to the caller.

pub mod classify;
pub mod executor;
pub mod target;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use classify::classify_output;
pub use executor::{ProbeCommand, ProbeExecutor, DEFAULT_PROBE_TIMEOUT, PROBE_COUNT};
pub use target::is_valid_target;

/// Outcome of a single probe invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A probe result as retained in the plugin's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ProbeRecord {
    pub fn from_result(target: impl Into<String>, result: &ProbeResult) -> Self {
        Self {
            target: target.into(),
            timestamp: Utc::now(),
            success: result.success,
            output: result.output.clone(),
            error: result.error.clone(),
            duration_ms: result.duration_ms,
        }
    }
}
