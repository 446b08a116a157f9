//! License gate for licensed HTTP operations.
//!
//! Every path under `/api/` needs a valid license except the license
//! endpoints themselves. The UI and the observability routes stay reachable
//! so an unlicensed plugin can be inspected and repaired.

use crate::error::PluginError;
use crate::license::{LicenseManager, LicenseSnapshot};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

pub const CONFIGURE_PATH: &str = "/api/license/configure";
pub const LICENSE_STATUS_PATH: &str = "/api/license/status";

/// Routes that bypass the gate regardless of license state.
pub const EXEMPT_PATHS: &[&str] = &["/", "/health", "/status", LICENSE_STATUS_PATH, CONFIGURE_PATH];

const LICENSED_PREFIX: &str = "/api/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Path is not a licensed operation.
    Pass,
    /// Licensed operation with a valid license.
    Allow,
    /// Licensed operation without a valid license; carries the license status.
    Deny { status: String },
}

pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
}

pub fn requires_license(path: &str) -> bool {
    !is_exempt(path) && path.starts_with(LICENSED_PREFIX)
}

pub fn evaluate(path: &str, license: &LicenseSnapshot) -> GateDecision {
    if !requires_license(path) {
        GateDecision::Pass
    } else if license.valid {
        GateDecision::Allow
    } else {
        GateDecision::Deny {
            status: license.status.to_string(),
        }
    }
}

/// Middleware that rejects licensed operations with 403 while unlicensed.
pub async fn require_license(
    State(license): State<Arc<LicenseManager>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let snapshot = license.status_snapshot().await;
    match evaluate(&path, &snapshot) {
        GateDecision::Pass | GateDecision::Allow => next.run(request).await,
        GateDecision::Deny { status } => {
            debug!("Denied {} (license status: {})", path, status);
            PluginError::LicenseRequired { status }.into_response()
        }
    }
}
