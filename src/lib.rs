pub mod clienv;
pub mod error;
pub mod gate;
pub mod health;
pub mod http_server;
pub mod license;
pub mod plugin_config;
pub mod probe;
pub mod state;
pub mod telemetry;

pub use error::{PluginError, Result};
pub use http_server::{build_router, AppState, HttpServer, HttpServerConfig};
pub use license::{HttpLicenseAuthority, LicenseAuthority, LicenseManager};
pub use plugin_config::{ConfigStore, PluginConfig};
pub use probe::{ProbeExecutor, ProbeResult};
pub use state::{shared_plugin_state, PluginState, SharedPluginState};
