use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use telemetry_client::{
    db::{MemoryStore, MongoStore, PgStore},
    TelemetryStore,
};

use crate::config::{StoreConfig, StoreKind};

/// Opens the configured backend.
pub async fn connect(cfg: &StoreConfig) -> Result<Arc<dyn TelemetryStore>> {
    let store: Arc<dyn TelemetryStore> = match cfg.kind {
        StoreKind::Mongo => {
            let store = MongoStore::connect(&cfg.uri, &cfg.database).await?;
            // An unreachable cluster is not fatal at startup; requests degrade instead.
            if let Err(e) = store.ping().await {
                tracing::warn!(error = %e, "mongodb ping failed");
            }
            Arc::new(store)
        }
        StoreKind::Pgwire => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .connect(&cfg.uri)
                .await
                .context("failed to connect to the pgwire store")?;
            Arc::new(PgStore::new(pool))
        }
        StoreKind::Memory => {
            let store = match &cfg.seed_csv {
                Some(path) => MemoryStore::from_csv_path(path)?,
                None => MemoryStore::new(),
            };
            tracing::info!(records = store.record_count(), "in-memory store loaded");
            Arc::new(store)
        }
    };

    tracing::info!(kind = ?cfg.kind, database = %cfg.database, "telemetry store ready");
    Ok(store)
}
