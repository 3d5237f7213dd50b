//! `pregrant-proxy`: run the proxy worker against the local backends until
//! Ctrl-C.

use anyhow::Context;
use pregrant::{Engine, EngineConfig};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = EngineConfig::from_env().context("reading configuration")?;
    let engine = Engine::open_local(config)
        .await
        .context("opening local backends")?;
    let worker = engine.worker();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => error!(error = %e, "cannot listen for Ctrl-C, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await.context("proxy worker")?;
    Ok(())
}
