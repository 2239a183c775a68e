use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

fn describe() {
    metrics::describe_counter!(
        "telemetry_collection_fetch_total",
        "Per-collection fetches during a merge, labelled by outcome"
    );
    metrics::describe_histogram!(
        "telemetry_merge_duration_seconds",
        "Wall time of one device merge"
    );
    metrics::describe_counter!("http_requests_total", "Dashboard HTTP requests by route");
    metrics::describe_counter!("export_requests_total", "Download requests by format");
}

/// Installs the global Prometheus recorder backing `/metrics`.
fn install_recorder() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    // Ignore error if the handle was already set; this should only be called once.
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

/// Installs the Prometheus recorder and serves `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address '{bind_addr}'"))?;

    install_recorder()?;

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics listener ready");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test in this crate that installs the global recorder.
    #[tokio::test]
    async fn recorded_counters_are_rendered() {
        install_recorder().unwrap();
        metrics::counter!("http_requests_total", "route" => "devices").increment(3);
        metrics::counter!("export_requests_total", "format" => "csv").increment(1);

        let body = metrics_handler().await;
        assert!(body.contains(r#"http_requests_total{route="devices"} 3"#), "{body}");
        assert!(body.contains(r#"export_requests_total{format="csv"} 1"#), "{body}");
    }
}
