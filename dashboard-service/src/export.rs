use rust_xlsxwriter::{Workbook, XlsxError};
use serde::Deserialize;
use telemetry_client::{domain::merged_table::format_timestamp, Cell, MergedTable, MetricRecord};

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_MIME: &str = "text/csv";
pub const NO_DATA_MESSAGE: &str = "No data to export.";

// Sheet limits of the xlsx format, header row included.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("spreadsheet encoding failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("csv encoding failed: {0}")]
    Csv(String),
    #[error("table of {rows} rows x {cols} columns exceeds the sheet limits")]
    TooLarge { rows: usize, cols: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

/// A header row plus data rows, ready to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw history rows as stored.
    pub fn from_records(records: &[MetricRecord]) -> Self {
        let columns = ["device_id", "timestamp", "device_pin_value", "device_name"]
            .into_iter()
            .map(String::from)
            .collect();
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    Cell::Text(r.device_id.clone()),
                    r.timestamp
                        .map(|ts| Cell::Text(format_timestamp(ts)))
                        .unwrap_or(Cell::Missing),
                    Cell::Number(r.device_pin_value),
                    r.device_name.clone().map(Cell::Text).unwrap_or(Cell::Missing),
                ]
            })
            .collect();
        Self { columns, rows }
    }
}

impl From<&MergedTable> for Sheet {
    fn from(table: &MergedTable) -> Self {
        Self {
            columns: table.column_names(),
            rows: table.rows.iter().map(|r| table.cells(r)).collect(),
        }
    }
}

/// Encoded export, or the plain-text answer for an empty table.
#[derive(Debug)]
pub enum Export {
    NoData,
    File {
        bytes: Vec<u8>,
        content_type: &'static str,
        filename: &'static str,
    },
}

pub fn export_sheet(sheet: &Sheet, format: ExportFormat) -> Result<Export, ExportError> {
    if sheet.is_empty() {
        return Ok(Export::NoData);
    }
    let export = match format {
        ExportFormat::Xlsx => Export::File {
            bytes: to_xlsx(sheet)?,
            content_type: XLSX_MIME,
            filename: "export.xlsx",
        },
        ExportFormat::Csv => Export::File {
            bytes: to_csv(sheet)?,
            content_type: CSV_MIME,
            filename: "export.csv",
        },
    };
    Ok(export)
}

pub fn to_xlsx(sheet: &Sheet) -> Result<Vec<u8>, ExportError> {
    let rows = sheet.rows.len() + 1;
    let cols = sheet.columns.len();
    if rows > MAX_ROWS || cols > MAX_COLS {
        return Err(ExportError::TooLarge { rows, cols });
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in sheet.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }
    for (idx, row) in sheet.rows.iter().enumerate() {
        let row_num = (idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) => {
                    worksheet.write_string(row_num, col as u16, s)?;
                }
                Cell::Number(v) => {
                    worksheet.write_number(row_num, col as u16, *v)?;
                }
                Cell::Missing => {}
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

pub fn to_csv(sheet: &Sheet) -> Result<Vec<u8>, ExportError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&sheet.columns)
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    for row in &sheet.rows {
        wtr.write_record(row.iter().map(|c| c.to_string()))
            .map_err(|e| ExportError::Csv(e.to_string()))?;
    }
    wtr.into_inner().map_err(|e| ExportError::Csv(e.to_string()))
}
