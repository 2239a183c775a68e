use std::{collections::HashMap, fs::File, io::Read, path::Path};

use csv::StringRecord;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::{ScanQuery, SortOrder, StoreError, TelemetryStore};
use crate::domain::MetricRecord;

/// Failure a [`MemoryStore`] collection can be told to return.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Connection,
    Query,
}

/// In-process store, ordered the way the document store orders results:
/// ascending scans put records without a timestamp first.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<MetricRecord>>,
    #[cfg(any(test, feature = "test-util"))]
    failures: HashMap<String, InjectedFailure>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: &str, record: MetricRecord) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    pub fn with_records(
        mut self,
        collection: &str,
        records: impl IntoIterator<Item = MetricRecord>,
    ) -> Self {
        for record in records {
            self.insert(collection, record);
        }
        self
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn with_failure(mut self, collection: &str, failure: InjectedFailure) -> Self {
        self.failures.insert(collection.to_string(), failure);
        self
    }

    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Loads a seed file with the header
    /// `collection,device_id,timestamp,device_pin_value,device_name`.
    ///
    /// `timestamp` (RFC3339) and `device_name` may be left empty.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| seed_error(path, format!("failed to open: {e}")))?;
        Self::from_csv_reader(file).map_err(|reason| seed_error(path, reason))
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, String> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| format!("failed to read CSV headers: {e}"))?
            .clone();

        let mut store = Self::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| format!("failed to read CSV record: {e}"))?;
            let (collection, metric) =
                record_to_metric(&record, &headers).map_err(|e| format!("record {line}: {e}"))?;
            store.insert(&collection, metric);
        }
        Ok(store)
    }

    #[cfg(any(test, feature = "test-util"))]
    fn check_failure(&self, collection: &str) -> Result<(), StoreError> {
        match self.failures.get(collection) {
            Some(InjectedFailure::Connection) => Err(StoreError::Connection(format!(
                "no route to store for '{collection}'"
            ))),
            Some(InjectedFailure::Query) => Err(StoreError::Query {
                collection: collection.to_string(),
                message: "injected query failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn check_failure(&self, _collection: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

fn seed_error(path: &Path, reason: String) -> StoreError {
    StoreError::Decode {
        collection: path.display().to_string(),
        reason,
    }
}

fn parse_optional_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn record_to_metric(
    record: &StringRecord,
    headers: &StringRecord,
) -> Result<(String, MetricRecord), String> {
    let get = |name: &str| -> Result<&str, String> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| format!("missing column '{name}'"))
    };

    let collection = get("collection")?.trim().to_string();
    let device_id = get("device_id")?.trim().to_string();

    let timestamp = match parse_optional_string(get("timestamp").unwrap_or("")) {
        Some(ts) => Some(
            OffsetDateTime::parse(&ts, &Rfc3339).map_err(|e| format!("invalid timestamp '{ts}': {e}"))?,
        ),
        None => None,
    };

    let value_str = get("device_pin_value")?;
    let device_pin_value: f64 = value_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid device_pin_value '{value_str}': {e}"))?;

    let device_name = get("device_name").ok().and_then(parse_optional_string);

    Ok((
        collection,
        MetricRecord {
            device_id,
            timestamp,
            device_pin_value,
            device_name,
        },
    ))
}

#[async_trait::async_trait]
impl TelemetryStore for MemoryStore {
    async fn distinct_device_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        self.check_failure(collection)?;
        let mut ids: Vec<String> = self
            .collections
            .get(collection)
            .map(|records| records.iter().map(|r| r.device_id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn scan(
        &self,
        collection: &str,
        query: &ScanQuery,
    ) -> Result<Vec<MetricRecord>, StoreError> {
        self.check_failure(collection)?;
        let mut records: Vec<MetricRecord> = self
            .collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|r| r.device_id == query.device_id && query.window.contains(r.timestamp))
            .cloned()
            .collect();

        match query.order {
            SortOrder::Ascending => records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
            SortOrder::Descending => records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        }
        if let Some(limit) = query.limit {
            records.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TimeWindow;
    use time::macros::datetime;

    #[tokio::test]
    async fn scan_filters_sorts_and_limits() {
        let store = MemoryStore::new().with_records(
            "gas-temp",
            vec![
                MetricRecord::new("D1", Some(datetime!(2030-01-03 00:00:00 UTC)), 3.0),
                MetricRecord::new("D2", Some(datetime!(2030-01-01 00:00:00 UTC)), 9.0),
                MetricRecord::new("D1", Some(datetime!(2030-01-01 00:00:00 UTC)), 1.0),
                MetricRecord::new("D1", Some(datetime!(2030-01-02 00:00:00 UTC)), 2.0),
            ],
        );

        let asc = store
            .scan("gas-temp", &ScanQuery::for_device("D1"))
            .await
            .unwrap();
        let values: Vec<f64> = asc.iter().map(|r| r.device_pin_value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);

        let latest = store
            .scan(
                "gas-temp",
                &ScanQuery::for_device("D1")
                    .order(SortOrder::Descending)
                    .limit(Some(1)),
            )
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].device_pin_value, 3.0);
    }

    #[tokio::test]
    async fn default_sum_respects_window() {
        let store = MemoryStore::new().with_records(
            "gas-flow-oc",
            vec![
                MetricRecord::new("D1", Some(datetime!(2030-01-01 10:00:00 UTC)), 2.0),
                MetricRecord::new("D1", Some(datetime!(2030-01-02 10:00:00 UTC)), 5.0),
                MetricRecord::new("D1", None, 100.0),
            ],
        );
        let day = TimeWindow::between(
            datetime!(2030-01-01 00:00:00 UTC),
            datetime!(2030-01-02 00:00:00 UTC),
        );
        assert_eq!(store.sum("gas-flow-oc", "D1", day).await.unwrap(), 2.0);
        assert_eq!(
            store.sum("gas-flow-oc", "D1", TimeWindow::all()).await.unwrap(),
            107.0
        );
        assert_eq!(store.sum("missing", "D1", TimeWindow::all()).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = MemoryStore::new().with_failure("pressure", InjectedFailure::Connection);
        let err = store.distinct_device_ids("pressure").await.unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn csv_seed_parses_optional_columns() {
        let data = "\
collection,device_id,timestamp,device_pin_value,device_name
gas-flow-oc,D1,2030-01-01T00:00:00Z,1.5,digester
pressure,D1,,0.9,
";
        let store = MemoryStore::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(store.record_count(), 2);
        let pressure = &store.collections["pressure"][0];
        assert_eq!(pressure.timestamp, None);
        assert_eq!(pressure.device_name, None);
        let flow = &store.collections["gas-flow-oc"][0];
        assert_eq!(flow.device_name.as_deref(), Some("digester"));
    }

    #[test]
    fn csv_seed_reports_bad_values() {
        let data = "collection,device_id,timestamp,device_pin_value,device_name\npressure,D1,,abc,\n";
        let err = MemoryStore::from_csv_reader(data.as_bytes()).unwrap_err();
        assert!(err.contains("device_pin_value"), "{err}");
    }
}
