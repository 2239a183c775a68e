//! Read-side queries behind the dashboard cards, selector and chart.

use std::collections::{BTreeMap, BTreeSet};

use time::{Date, Duration, OffsetDateTime};

use crate::{
    db::{ScanQuery, SortOrder, StoreError, TelemetryStore, TimeWindow},
    domain::MetricRecord,
};

/// Sorted union of device ids across `collections`.
///
/// Collections that fail are logged and left out.
pub async fn device_ids(store: &dyn TelemetryStore, collections: &[String]) -> Vec<String> {
    let mut ids = BTreeSet::new();
    for collection in collections {
        match store.distinct_device_ids(collection).await {
            Ok(found) => ids.extend(found),
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "failed to list device ids");
            }
        }
    }
    ids.into_iter().collect()
}

/// Most recent record per collection for one device.
///
/// Collections with no record for the device, or that fail, are absent.
pub async fn latest_metrics(
    store: &dyn TelemetryStore,
    collections: &[String],
    device_id: &str,
) -> BTreeMap<String, MetricRecord> {
    let query = ScanQuery::for_device(device_id)
        .order(SortOrder::Descending)
        .limit(Some(1));

    let mut latest = BTreeMap::new();
    for collection in collections {
        match store.scan(collection, &query).await {
            Ok(records) => {
                if let Some(record) = records.into_iter().next() {
                    latest.insert(collection.clone(), record);
                }
            }
            Err(e) => {
                tracing::warn!(
                    collection = %collection,
                    device_id,
                    error = %e,
                    "failed to fetch latest record"
                );
            }
        }
    }
    latest
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaySums {
    pub yesterday: f64,
    pub today: f64,
}

fn midnight(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}

/// Totals for the UTC day before `today` and for `today` itself.
pub async fn day_sums(
    store: &dyn TelemetryStore,
    collection: &str,
    device_id: &str,
    today: Date,
) -> Result<DaySums, StoreError> {
    let today_start = midnight(today);
    let yesterday_start = today_start - Duration::days(1);
    let tomorrow_start = today_start + Duration::days(1);

    let yesterday = store
        .sum(collection, device_id, TimeWindow::between(yesterday_start, today_start))
        .await?;
    let today = store
        .sum(collection, device_id, TimeWindow::between(today_start, tomorrow_start))
        .await?;

    Ok(DaySums { yesterday, today })
}

/// Sum of every record of the device.
pub async fn total(
    store: &dyn TelemetryStore,
    collection: &str,
    device_id: &str,
) -> Result<f64, StoreError> {
    store.sum(collection, device_id, TimeWindow::all()).await
}

/// Ascending records of one collection since `since`.
pub async fn history(
    store: &dyn TelemetryStore,
    collection: &str,
    device_id: &str,
    since: OffsetDateTime,
) -> Result<Vec<MetricRecord>, StoreError> {
    let query = ScanQuery::for_device(device_id).window(TimeWindow::since(since));
    store.scan(collection, &query).await
}
