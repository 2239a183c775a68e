use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use telemetry_client::{aggregate, Cell, CollectionOutcome, CollectionReport};
use time::OffsetDateTime;

use super::{selected, ApiError, AppState, DeviceQuery, MAX_PAGE_SIZE};
use crate::{
    cards::{self, SummaryCards},
    chart,
};

pub const NO_DEVICE_DATA: &str = "No data available for this device";

#[derive(Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<String>,
}

pub async fn devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    metrics::counter!("http_requests_total", "route" => "devices").increment(1);
    let devices = aggregate::device_ids(state.store.as_ref(), &state.telemetry.collections).await;
    Json(DevicesResponse { devices })
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Json<SummaryCards> {
    metrics::counter!("http_requests_total", "route" => "summary").increment(1);
    let today = OffsetDateTime::now_utc().date();
    let cards = cards::summary_cards(
        state.store.as_ref(),
        &state.telemetry.roles,
        query.device(),
        today,
    )
    .await;
    Json(cards)
}

/// Plotly figure JSON for the gas production chart.
pub async fn chart(State(state): State<AppState>, Query(query): Query<DeviceQuery>) -> Response {
    metrics::counter!("http_requests_total", "route" => "chart").increment(1);
    let records = match query.device() {
        Some(device_id) => {
            let collection = &state.telemetry.roles.gas_flow;
            match aggregate::history(state.store.as_ref(), collection, device_id, state.history_since()).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(device_id, error = %e, "gas production history unavailable");
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    let plot = chart::gas_production_plot(&records);
    ([(header::CONTENT_TYPE, "application/json")], plot.to_json()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct TableQuery {
    pub device_id: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    #[serde(default)]
    pub snapshot: bool,
}

#[derive(Debug, Serialize)]
pub struct OutcomeView {
    pub collection: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CollectionReport> for OutcomeView {
    fn from(report: &CollectionReport) -> Self {
        let (rows, error) = match &report.outcome {
            CollectionOutcome::Ok { rows } => (Some(*rows), None),
            CollectionOutcome::Empty => (None, None),
            CollectionOutcome::Failed { error } => (None, Some(error.to_string())),
        };
        Self {
            collection: report.collection.clone(),
            status: report.outcome.status(),
            rows,
            error,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct TableResponse {
    pub device_id: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub page: usize,
    pub page_size: usize,
    pub total_rows: usize,
    pub message: Option<String>,
    pub collections: Vec<OutcomeView>,
}

/// One page of the merged history.
pub async fn table(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<Json<TableResponse>, ApiError> {
    metrics::counter!("http_requests_total", "route" => "table").increment(1);
    let page = query.page.unwrap_or(0);
    let page_size = query.page_size.unwrap_or(state.page_size).clamp(1, MAX_PAGE_SIZE);

    let Some(device_id) = selected(query.device_id.as_deref()) else {
        return Ok(Json(TableResponse {
            page,
            page_size,
            ..TableResponse::default()
        }));
    };

    let report = if query.snapshot {
        state.merger.merge_snapshot(state.store.as_ref(), device_id).await?
    } else {
        state.merger.merge(state.store.as_ref(), device_id).await?
    };
    let table = &report.table;

    let message = table.is_empty().then(|| NO_DEVICE_DATA.to_string());
    let rows = table.page(page, page_size).iter().map(|r| table.cells(r)).collect();

    Ok(Json(TableResponse {
        device_id: Some(device_id.to_string()),
        columns: if table.is_empty() { Vec::new() } else { table.column_names() },
        rows,
        page,
        page_size,
        total_rows: table.len(),
        message,
        collections: report.collections.iter().map(OutcomeView::from).collect(),
    }))
}
