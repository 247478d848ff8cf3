use crate::domain::ContainerRuntime;
use crate::infra::{AppConfig, PodmanAdapter, load_config};
use crate::runtime::build_server;
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(config_path: &Path, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    serve(config).await
}

async fn serve(config: AppConfig) -> Result<()> {
    let runtime = Arc::new(PodmanAdapter::new(
        &config.runtime.engine,
        &config.runtime.host,
        config.runtime.startup_timeout(),
    ));
    if !runtime.is_available().await {
        bail!(
            "container engine '{}' is not available, is it installed?",
            config.runtime.engine
        );
    }

    let server = build_server(&config, runtime);
    if server.services().is_empty() {
        warn!("No services enabled; only /health will be served");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    match server.start(shutdown).await {
        Err(e) if !e.is_cancelled() => Err(e).context("server failed"),
        _ => {
            info!("Shutdown complete");
            Ok(())
        }
    }
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
