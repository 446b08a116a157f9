use std::sync::Arc;

use corebridge_ping::clienv;
use corebridge_ping::license::{
    spawn_revalidation, HttpLicenseAuthority, LicenseManager, REVALIDATION_INTERVAL,
    VALIDATION_TIMEOUT,
};
use corebridge_ping::probe::{ProbeCommand, ProbeExecutor};
use corebridge_ping::telemetry::{register_with_core, CoreClient, Reporter};
use corebridge_ping::{shared_plugin_state, AppState, ConfigStore, HttpServer, HttpServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(crate) async fn cmd_serve(port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or_else(clienv::port);

    let plugin = shared_plugin_state();
    let authority = HttpLicenseAuthority::new(clienv::license_manager_url(), VALIDATION_TIMEOUT)?;
    let license = Arc::new(LicenseManager::new(
        Arc::new(authority),
        ConfigStore::from_env(),
        plugin.clone(),
    ));
    let executor = Arc::new(ProbeExecutor::new(ProbeCommand::system_ping()));
    let core = CoreClient::new(clienv::core_api_url())?;

    let shutdown = CancellationToken::new();
    listen_for_signals(shutdown.clone())?;

    // Validation may take up to the authority timeout; serve meanwhile.
    let init = {
        let license = license.clone();
        tokio::spawn(async move {
            license.initialize().await;
        })
    };

    let revalidation = spawn_revalidation(
        license.clone(),
        REVALIDATION_INTERVAL,
        shutdown.child_token(),
    );
    let reporter = Reporter::new(core.clone(), plugin.clone(), license.clone())
        .spawn(shutdown.child_token());

    {
        let core = core.clone();
        tokio::spawn(async move { register_with_core(&core, port).await });
    }

    let state = AppState {
        plugin,
        license,
        executor,
    };
    let config = HttpServerConfig {
        port,
        ..HttpServerConfig::default()
    };

    let result = HttpServer::new(config, state).run(shutdown.clone()).await;

    shutdown.cancel();
    init.abort();
    for (name, task) in [("revalidation", revalidation), ("reporter", reporter)] {
        if let Err(e) = task.await {
            warn!("{} task ended abnormally: {}", name, e);
        }
    }

    info!("Shutdown complete");
    result
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
fn listen_for_signals(shutdown: CancellationToken) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            shutdown.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C, shutting down gracefully");
            shutdown.cancel();
        });
    }

    Ok(())
}
