use std::{collections::BTreeMap, time::Instant};

use crate::{
    db::{ScanQuery, StoreError, TelemetryStore},
    domain::{merged_table::value_column, JoinKey, MergedRow, MergedTable, MetricRecord},
};

/// How one collection fared during a merge.
#[derive(Debug)]
pub enum CollectionOutcome {
    Ok { rows: usize },
    Empty,
    Failed { error: StoreError },
}

impl CollectionOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CollectionOutcome::Ok { .. } => "ok",
            CollectionOutcome::Empty => "empty",
            CollectionOutcome::Failed { .. } => "error",
        }
    }
}

#[derive(Debug)]
pub struct CollectionReport {
    pub collection: String,
    pub outcome: CollectionOutcome,
}

/// Merged table plus what happened to every configured collection.
#[derive(Debug)]
pub struct MergeReport {
    pub table: MergedTable,
    pub collections: Vec<CollectionReport>,
}

impl MergeReport {
    pub fn failed(&self) -> impl Iterator<Item = &CollectionReport> {
        self.collections
            .iter()
            .filter(|c| matches!(c.outcome, CollectionOutcome::Failed { .. }))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    /// Every collection failed to reach the store.
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Default)]
struct Slot {
    device_name: Option<String>,
    values: Vec<Option<f64>>,
}

/// Outer-join accumulator keyed by [`JoinKey`].
#[derive(Default)]
struct Accumulator {
    columns: Vec<String>,
    slots: BTreeMap<JoinKey, Slot>,
}

impl Accumulator {
    fn join(&mut self, collection: &str, records: Vec<MetricRecord>) -> usize {
        let column = self.columns.len();
        self.columns.push(value_column(collection));

        // Positional keys unless every record carries a timestamp.
        let by_timestamp = records.iter().all(|r| r.timestamp.is_some());
        let mut collapsed = 0;

        for (idx, record) in records.into_iter().enumerate() {
            let key = match (by_timestamp, record.timestamp) {
                (true, Some(ts)) => JoinKey::Timestamp(ts),
                _ => JoinKey::RowIndex(idx as u64),
            };
            let slot = self.slots.entry(key).or_default();
            if slot.values.len() <= column {
                slot.values.resize(column + 1, None);
            }
            if slot.values[column].replace(record.device_pin_value).is_some() {
                collapsed += 1;
            }
            if slot.device_name.is_none() {
                slot.device_name = record.device_name;
            }
        }
        collapsed
    }

    fn finish(self) -> MergedTable {
        let width = self.columns.len();
        let rows = self
            .slots
            .into_iter()
            .map(|(key, mut slot)| {
                slot.values.resize(width, None);
                MergedRow {
                    key,
                    device_name: slot.device_name,
                    values: slot.values,
                }
            })
            .collect();
        MergedTable {
            value_columns: self.columns,
            rows,
        }
    }
}

/// Builds one row-aligned table per device from the configured metric
/// collections.
#[derive(Debug, Clone)]
pub struct TelemetryMerger {
    collections: Vec<String>,
    scan_limit: Option<i64>,
}

impl TelemetryMerger {
    pub fn new(collections: Vec<String>, scan_limit: Option<i64>) -> Self {
        Self {
            collections,
            scan_limit,
        }
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Full history of `device_id`, outer-joined across collections.
    ///
    /// A failing collection is skipped and reported; only when every
    /// collection fails to reach the store is the merge itself an error.
    pub async fn merge(
        &self,
        store: &dyn TelemetryStore,
        device_id: &str,
    ) -> Result<MergeReport, MergeError> {
        let started = Instant::now();
        let query = ScanQuery::for_device(device_id).limit(self.scan_limit);
        let mut acc = Accumulator::default();
        let mut reports = Vec::with_capacity(self.collections.len());

        for collection in &self.collections {
            let outcome = match store.scan(collection, &query).await {
                Ok(records) if records.is_empty() => CollectionOutcome::Empty,
                Ok(records) => {
                    let rows = records.len();
                    let collapsed = acc.join(collection, records);
                    if collapsed > 0 {
                        tracing::debug!(
                            collection = %collection,
                            device_id,
                            collapsed,
                            "duplicate join keys collapsed to the last record"
                        );
                    }
                    CollectionOutcome::Ok { rows }
                }
                Err(error) => {
                    tracing::warn!(
                        collection = %collection,
                        device_id,
                        error = %error,
                        "skipping collection in merge"
                    );
                    CollectionOutcome::Failed { error }
                }
            };

            metrics::counter!(
                "telemetry_collection_fetch_total",
                "collection" => collection.clone(),
                "outcome" => outcome.status()
            )
            .increment(1);

            reports.push(CollectionReport {
                collection: collection.clone(),
                outcome,
            });
        }

        let all_unreachable = !reports.is_empty()
            && reports.iter().all(|r| {
                matches!(&r.outcome, CollectionOutcome::Failed { error } if error.is_connection())
            });
        if all_unreachable {
            let message = reports
                .iter()
                .find_map(|r| match &r.outcome {
                    CollectionOutcome::Failed { error } => Some(error.to_string()),
                    _ => None,
                })
                .unwrap_or_else(|| "store unreachable".to_string());
            return Err(MergeError::Unavailable(message));
        }

        let table = acc.finish();
        metrics::histogram!("telemetry_merge_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::debug!(
            device_id,
            rows = table.len(),
            columns = table.value_columns.len(),
            "merged device telemetry"
        );

        Ok(MergeReport {
            table,
            collections: reports,
        })
    }

    /// One row per device: the first row of the full merge.
    pub async fn merge_snapshot(
        &self,
        store: &dyn TelemetryStore,
        device_id: &str,
    ) -> Result<MergeReport, MergeError> {
        let report = self.merge(store, device_id).await?;
        Ok(MergeReport {
            table: report.table.first_row_only(),
            collections: report.collections,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::db::{memory::InjectedFailure, MemoryStore};
    use time::macros::datetime;

    const COLLECTIONS: [&str; 3] = ["gas-flow-oc", "gas-temp", "pressure"];

    fn merger(collections: &[&str]) -> TelemetryMerger {
        TelemetryMerger::new(collections.iter().map(|c| c.to_string()).collect(), Some(10_000))
    }

    fn sample_store() -> MemoryStore {
        MemoryStore::new()
            .with_records(
                "gas-flow-oc",
                vec![
                    MetricRecord::new("D1", Some(datetime!(2030-01-01 00:00:00 UTC)), 1.0)
                        .with_name("digester"),
                    MetricRecord::new("D1", Some(datetime!(2030-01-01 01:00:00 UTC)), 2.0)
                        .with_name("digester"),
                    MetricRecord::new("D2", Some(datetime!(2030-01-01 00:00:00 UTC)), 50.0),
                ],
            )
            .with_records(
                "gas-temp",
                vec![
                    MetricRecord::new("D1", Some(datetime!(2030-01-01 01:00:00 UTC)), 31.0),
                    MetricRecord::new("D1", Some(datetime!(2030-01-01 02:00:00 UTC)), 32.0),
                ],
            )
    }

    #[tokio::test]
    async fn outer_join_keeps_every_key() {
        let store = sample_store();
        let report = merger(&COLLECTIONS).merge(&store, "D1").await.unwrap();
        let table = report.table;

        assert_eq!(table.len(), 3);
        assert_eq!(table.value_columns, vec!["gas_flow_oc_value", "gas_temp_value"]);
        assert_eq!(
            table.column_names(),
            vec!["timestamp", "device_name", "gas_flow_oc_value", "gas_temp_value"]
        );

        let first = &table.rows[0];
        assert_eq!(first.key, JoinKey::Timestamp(datetime!(2030-01-01 00:00:00 UTC)));
        assert_eq!(table.value(first, "gas_flow_oc_value"), Some(1.0));
        assert_eq!(table.value(first, "gas_temp_value"), None);

        let last = &table.rows[2];
        assert_eq!(table.value(last, "gas_flow_oc_value"), None);
        assert_eq!(table.value(last, "gas_temp_value"), Some(32.0));
        assert_eq!(last.device_name, None);

        assert!(matches!(report.collections[2].outcome, CollectionOutcome::Empty));
    }

    #[tokio::test]
    async fn keys_are_unique_and_sorted() {
        let store = sample_store().with_records(
            "pressure",
            vec![
                MetricRecord::new("D1", Some(datetime!(2030-01-01 01:00:00 UTC)), 0.8),
                MetricRecord::new("D1", Some(datetime!(2030-01-01 01:00:00 UTC)), 0.9),
            ],
        );
        let table = merger(&COLLECTIONS).merge(&store, "D1").await.unwrap().table;

        let keys: Vec<JoinKey> = table.rows.iter().map(|r| r.key).collect();
        let unique: HashSet<JoinKey> = keys.iter().copied().collect();
        assert_eq!(unique.len(), keys.len());
        assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let dup = &table.rows[1];
        assert_eq!(table.value(dup, "pressure_value"), Some(0.9));
    }

    #[tokio::test]
    async fn unknown_device_yields_empty_table() {
        let store = sample_store();
        let report = merger(&COLLECTIONS).merge(&store, "nope").await.unwrap();
        assert!(report.table.is_empty());
        assert!(report.table.value_columns.is_empty());
        assert!(report
            .collections
            .iter()
            .all(|c| matches!(c.outcome, CollectionOutcome::Empty)));
    }

    #[tokio::test]
    async fn untimed_collections_align_by_row_index() {
        let store = MemoryStore::new()
            .with_records(
                "battery-per",
                vec![
                    MetricRecord::new("D1", None, 90.0),
                    MetricRecord::new("D1", None, 89.0),
                ],
            )
            .with_records("pressure", vec![MetricRecord::new("D1", None, 1.1)]);
        let table = merger(&["battery-per", "pressure"])
            .merge(&store, "D1")
            .await
            .unwrap()
            .table;

        assert_eq!(table.key_column(), "row_index");
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(&table.rows[0], "pressure_value"), Some(1.1));
        assert_eq!(table.value(&table.rows[1], "pressure_value"), None);
        assert_eq!(table.value(&table.rows[1], "battery_per_value"), Some(89.0));
    }

    #[tokio::test]
    async fn partially_timed_collection_falls_back_to_row_index() {
        let store = MemoryStore::new().with_records(
            "pressure",
            vec![
                MetricRecord::new("D1", None, 1.0),
                MetricRecord::new("D1", Some(datetime!(2030-01-01 00:00:00 UTC)), 2.0),
            ],
        );
        let table = merger(&["pressure"]).merge(&store, "D1").await.unwrap().table;
        assert_eq!(
            table.rows.iter().map(|r| r.key).collect::<Vec<_>>(),
            vec![JoinKey::RowIndex(0), JoinKey::RowIndex(1)]
        );
    }

    #[tokio::test]
    async fn merge_is_independent_of_collection_order() {
        let store = sample_store().with_records(
            "pressure",
            vec![MetricRecord::new("D1", Some(datetime!(2030-01-01 03:00:00 UTC)), 0.7)],
        );
        let forward = merger(&COLLECTIONS).merge(&store, "D1").await.unwrap().table;
        let reversed = merger(&["pressure", "gas-temp", "gas-flow-oc"])
            .merge(&store, "D1")
            .await
            .unwrap()
            .table;

        assert_eq!(forward.len(), reversed.len());
        for (a, b) in forward.rows.iter().zip(&reversed.rows) {
            assert_eq!(a.key, b.key);
            assert_eq!(a.device_name, b.device_name);
            for column in &forward.value_columns {
                assert_eq!(forward.value(a, column), reversed.value(b, column), "{column}");
            }
        }
    }

    #[tokio::test]
    async fn failing_collection_is_reported_and_skipped() {
        let store = sample_store().with_failure("gas-temp", InjectedFailure::Query);
        let report = merger(&COLLECTIONS).merge(&store, "D1").await.unwrap();

        assert_eq!(report.table.value_columns, vec!["gas_flow_oc_value"]);
        assert_eq!(report.table.len(), 2);
        let failed: Vec<&str> = report.failed().map(|c| c.collection.as_str()).collect();
        assert_eq!(failed, vec!["gas-temp"]);
        assert_eq!(report.collections[0].outcome.status(), "ok");
    }

    #[tokio::test]
    async fn total_connectivity_loss_is_fatal() {
        let store = COLLECTIONS
            .iter()
            .fold(MemoryStore::new(), |s, c| s.with_failure(c, InjectedFailure::Connection));
        let err = merger(&COLLECTIONS).merge(&store, "D1").await.unwrap_err();
        assert!(err.to_string().contains("store unreachable"), "{err}");
    }

    #[tokio::test]
    async fn mixed_failures_are_not_fatal() {
        let store = MemoryStore::new()
            .with_failure("gas-flow-oc", InjectedFailure::Connection)
            .with_failure("gas-temp", InjectedFailure::Query)
            .with_failure("pressure", InjectedFailure::Connection);
        let report = merger(&COLLECTIONS).merge(&store, "D1").await.unwrap();
        assert!(report.table.is_empty());
        assert_eq!(report.failed().count(), 3);
    }

    #[tokio::test]
    async fn snapshot_keeps_the_oldest_row() {
        let store = sample_store();
        let report = merger(&COLLECTIONS).merge_snapshot(&store, "D1").await.unwrap();
        assert_eq!(report.table.len(), 1);
        assert_eq!(
            report.table.rows[0].key,
            JoinKey::Timestamp(datetime!(2030-01-01 00:00:00 UTC))
        );
    }
}
