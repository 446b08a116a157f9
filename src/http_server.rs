//! HTTP surface: UI, observability routes and the licensed probe API.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::clienv::{PLUGIN_ID, PLUGIN_NAME, PLUGIN_VERSION};
use crate::error::{PluginError, Result};
use crate::gate::{self, CONFIGURE_PATH, LICENSE_STATUS_PATH};
use crate::health::{HealthReport, HostChecks, ProcessMemory};
use crate::license::{LicenseManager, LicenseSnapshot};
use crate::probe::{is_valid_target, ProbeExecutor, ProbeRecord, ProbeResult};
use crate::state::SharedPluginState;

const INDEX_HTML: &str = include_str!("ui/index.html");

/// Probe records included in `/status`.
const RECENT_PROBES: usize = 10;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub plugin: SharedPluginState,
    pub license: Arc<LicenseManager>,
    pub executor: Arc<ProbeExecutor>,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: 3007,
            host: "0.0.0.0".to_string(),
        }
    }
}

pub struct HttpServer {
    config: HttpServerConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` is cancelled, then drain in-flight requests.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = build_router(self.state);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("{} plugin running on {}", PLUGIN_NAME, addr);
        info!("GUI available at: http://localhost:{}", self.config.port);
        info!("Health check: http://localhost:{}/health", self.config.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/ping", post(ping_handler))
        .route(CONFIGURE_PATH, post(license_configure_handler))
        .route(LICENSE_STATUS_PATH, get(license_status_handler));

    with_layers(routes, state)
}

/// Innermost first: panic recovery, license gate, request accounting, CORS,
/// tracing. A recovered panic is a 500 and is counted as an error.
fn with_layers(routes: Router<AppState>, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    routes
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(
            state.license.clone(),
            gate::require_license,
        ))
        .layer(middleware::from_fn_with_state(
            state.plugin.clone(),
            count_requests,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    PluginError::Internal(detail).into_response()
}

/// Counts API requests and server-side failures. Observability routes are
/// not counted so reading them never changes what they report.
async fn count_requests(
    State(plugin): State<SharedPluginState>,
    request: Request,
    next: Next,
) -> Response {
    let counted = request.uri().path().starts_with("/api/");
    if counted {
        plugin.write().await.request_count += 1;
    }

    let response = next.run(request).await;

    if response.status().is_server_error() {
        plugin.write().await.error_count += 1;
    }
    response
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let program = state.executor.command().program().to_string();
    let host = tokio::task::spawn_blocking(move || HostChecks::gather(&program))
        .await
        .unwrap_or_else(|e| {
            warn!("Host health checks did not complete: {}", e);
            HostChecks::failed()
        });

    let license = state.license.status_snapshot().await;
    let report = {
        let plugin = state.plugin.read().await;
        HealthReport::collect(&plugin, &license, host)
    };

    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let license = state.license.status_snapshot().await;
    let plugin = state.plugin.read().await;

    Json(json!({
        "plugin": {
            "id": PLUGIN_ID,
            "name": PLUGIN_NAME,
            "version": PLUGIN_VERSION,
            "uptime": plugin.uptime_secs(),
            "healthy": plugin.healthy,
        },
        "license": license,
        "statistics": {
            "totalRequests": plugin.request_count,
            "totalErrors": plugin.error_count,
            "totalProbes": plugin.probe_history.len(),
            "successfulProbes": plugin.probe_history.successful(),
            "errorRate": plugin.error_rate(),
        },
        "recentProbes": plugin.probe_history.tail(RECENT_PROBES),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    let memory = tokio::task::spawn_blocking(ProcessMemory::current)
        .await
        .ok()
        .flatten();
    let plugin = state.plugin.read().await;

    Json(json!({
        "timestamp": Utc::now(),
        "uptime": plugin.uptime_secs(),
        "memory": memory,
        "requests": {
            "total": plugin.request_count,
            "errors": plugin.error_count,
        },
        "probes": {
            "total": plugin.probe_history.len(),
            "successful": plugin.probe_history.successful(),
            "failed": plugin.probe_history.failed(),
        },
    }))
}

#[derive(Debug, Deserialize)]
struct PingRequest {
    domain: Option<String>,
}

async fn ping_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PingRequest>, JsonRejection>,
) -> Result<Json<ProbeResult>> {
    let domain = payload
        .ok()
        .and_then(|Json(body)| body.domain)
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or(PluginError::MissingField("Domain"))?;

    if !is_valid_target(&domain) {
        return Err(PluginError::InvalidTarget(domain));
    }

    info!("Pinging domain: {}", domain);
    let result = state.executor.probe(&domain).await;

    state
        .plugin
        .write()
        .await
        .record_probe(ProbeRecord::from_result(&domain, &result));

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureRequest {
    license_key: Option<String>,
}

async fn license_configure_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ConfigureRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let key = payload
        .ok()
        .and_then(|Json(body)| body.license_key)
        .ok_or(PluginError::MissingField("License key"))?;

    let outcome = state.license.configure(&key).await?;
    let license = state.license.status_snapshot().await;

    Ok(Json(json!({
        "success": true,
        "message": "License configured successfully",
        "license": license,
        "data": outcome.data,
    })))
}

async fn license_status_handler(State(state): State<AppState>) -> Json<LicenseSnapshot> {
    Json(state.license.status_snapshot().await)
}
