use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use telemetry_client::aggregate;

use super::{selected, ApiError, AppState};
use crate::export::{export_sheet, Export, ExportFormat, Sheet, NO_DATA_MESSAGE};

pub const NO_DEVICE_MESSAGE: &str = "No device selected.";

/// What a download contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportSource {
    /// Raw gas-flow records over the trailing history window.
    #[default]
    History,
    /// Full merged table across all collections.
    Merged,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub device_id: Option<String>,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub source: ExportSource,
}

fn plain_text(body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

/// Re-fetches the requested data for `device_id` and streams it back.
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    metrics::counter!("export_requests_total", "format" => query.format.label()).increment(1);

    let Some(device_id) = selected(query.device_id.as_deref()) else {
        return Ok(plain_text(NO_DEVICE_MESSAGE));
    };

    let sheet = match query.source {
        ExportSource::History => {
            let records = aggregate::history(
                state.store.as_ref(),
                &state.telemetry.roles.gas_flow,
                device_id,
                state.history_since(),
            )
            .await?;
            Sheet::from_records(&records)
        }
        ExportSource::Merged => {
            let report = state.merger.merge(state.store.as_ref(), device_id).await?;
            Sheet::from(&report.table)
        }
    };

    match export_sheet(&sheet, query.format)? {
        Export::NoData => Ok(plain_text(NO_DATA_MESSAGE)),
        Export::File {
            bytes,
            content_type,
            filename,
        } => {
            tracing::info!(device_id, rows = sheet.rows.len(), filename, "export generated");
            let disposition = format!("attachment;filename={filename}");
            Ok((
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response())
        }
    }
}
