use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use opsradar_api::app::{AppServices, build_app, services::connect_store};
use opsradar_infra::{EngineConfig, RecomputeCoordinator, ScanRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    opsradar_observability::init();

    let config = EngineConfig::from_env().context("reading engine configuration")?;
    let database_url = std::env::var("DATABASE_URL").ok();
    let store = connect_store(database_url.as_deref()).await?;
    let coordinator = Arc::new(RecomputeCoordinator::new(store, config.clone()));

    let runner = match ScanRunner::from_config(&config) {
        Some(runner) => Some(runner.spawn("scan-runner", Arc::clone(&coordinator))),
        None => {
            tracing::info!("OPSRADAR_SCAN_INTERVAL_SECS not set; scheduled scans disabled");
            None
        }
    };
    let trigger = runner.as_ref().map(|handle| handle.trigger_handle());
    let app = build_app(Arc::new(AppServices::new(coordinator, trigger)));

    let bind_addr = std::env::var("OPSRADAR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "opsradar-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(handle) = runner {
        handle.shutdown().await;
    }
    Ok(())
}
