use anyhow::{Context, Result};
use dashboard_service::{config::AppConfig, metrics_server, observability, router, store, AppState};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = store::connect(&cfg.store).await?;
    let state = AppState::new(store, cfg.telemetry.clone(), cfg.http.page_size);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(cfg.http.bind_addr.as_str())
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind_addr))?;
    tracing::info!(
        addr = %cfg.http.bind_addr,
        collections = ?cfg.telemetry.collections,
        "dashboard listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
