use std::{env, fs, path::PathBuf};

use anyhow::{bail, Result};
use dashboard_service::{
    config::AppConfig,
    export::{export_sheet, Export, ExportFormat, Sheet},
    observability, store,
};
use telemetry_client::TelemetryMerger;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: export_device <device_id> [output.xlsx|output.csv]");
    }
    let device_id = &args[1];
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("export.xlsx"));
    let format = match output.extension().and_then(|e| e.to_str()) {
        Some("csv") => ExportFormat::Csv,
        _ => ExportFormat::Xlsx,
    };

    // Same config file as the dashboard (DASHBOARD_CONFIG).
    let cfg = AppConfig::load()?;
    let store = store::connect(&cfg.store).await?;

    let merger = TelemetryMerger::new(cfg.telemetry.collections.clone(), Some(cfg.telemetry.scan_limit));
    let report = merger.merge(store.as_ref(), device_id).await?;
    for failed in report.failed() {
        tracing::warn!(collection = %failed.collection, "collection left out of export");
    }

    match export_sheet(&Sheet::from(&report.table), format)? {
        Export::NoData => bail!("no data found for device_id '{device_id}'"),
        Export::File { bytes, .. } => {
            fs::write(&output, bytes)?;
            tracing::info!(
                device_id = %device_id,
                rows = report.table.len(),
                output = %output.display(),
                "merged table exported"
            );
        }
    }

    Ok(())
}
