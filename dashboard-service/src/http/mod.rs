pub mod api;
pub mod download;
pub mod page;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use telemetry_client::{MergeError, StoreError, TelemetryMerger, TelemetryStore};
use time::{Date, Duration, OffsetDateTime};

use crate::{config::TelemetryConfig, export::ExportError};

/// Upper bound for a client-requested table page.
pub const MAX_PAGE_SIZE: usize = 500;

/// Shared, read-only handles; nothing computed for one request is kept here.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TelemetryStore>,
    pub merger: Arc<TelemetryMerger>,
    pub telemetry: Arc<TelemetryConfig>,
    pub page_size: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn TelemetryStore>, telemetry: TelemetryConfig, page_size: usize) -> Self {
        let merger = TelemetryMerger::new(telemetry.collections.clone(), Some(telemetry.scan_limit));
        Self {
            store,
            merger: Arc::new(merger),
            telemetry: Arc::new(telemetry),
            page_size,
        }
    }

    /// Start of the trailing chart/export window; a window reaching past the
    /// representable range starts at the earliest instant.
    pub fn history_since(&self) -> OffsetDateTime {
        self.telemetry
            .history_days
            .checked_mul(86_400)
            .map(Duration::seconds)
            .and_then(|window| OffsetDateTime::now_utc().checked_sub(window))
            .unwrap_or_else(|| Date::MIN.midnight().assume_utc())
    }
}

/// `?device_id=` as sent by the device selector; blank means none selected.
#[derive(Debug, Default, Deserialize)]
pub struct DeviceQuery {
    pub device_id: Option<String>,
}

impl DeviceQuery {
    pub fn device(&self) -> Option<&str> {
        selected(self.device_id.as_deref())
    }
}

pub(crate) fn selected(device_id: Option<&str>) -> Option<&str> {
    device_id.map(str::trim).filter(|id| !id.is_empty())
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Merge(MergeError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(e) if e.is_connection() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) | ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self, status = status.as_u16(), "request failed");
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page::index))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/devices", get(api::devices))
        .route("/api/summary", get(api::summary))
        .route("/api/chart", get(api::chart))
        .route("/api/table", get(api::table))
        .route("/download", get(download::download))
        .with_state(state)
}
