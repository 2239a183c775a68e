pub mod memory;
pub mod mongo;
pub mod pgwire;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use pgwire::PgStore;

use time::OffsetDateTime;

use crate::domain::MetricRecord;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Connection(String),
    #[error("query on collection '{collection}' failed: {message}")]
    Query { collection: String, message: String },
    #[error("collection '{collection}': {reason}")]
    Decode { collection: String, reason: String },
    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Half-open `[start, end)` window on the `timestamp` field.
///
/// A bounded window never matches records without a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(start: OffsetDateTime) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn between(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn contains(&self, ts: Option<OffsetDateTime>) -> bool {
        if !self.is_bounded() {
            return true;
        }
        let Some(ts) = ts else {
            return false;
        };
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }
}

/// Filtered scan of one collection for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanQuery {
    pub device_id: String,
    pub window: TimeWindow,
    pub order: SortOrder,
    pub limit: Option<i64>,
}

impl ScanQuery {
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            window: TimeWindow::all(),
            order: SortOrder::Ascending,
            limit: None,
        }
    }

    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }
}

/// Read-only access to the per-metric collections.
#[async_trait::async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn distinct_device_ids(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    async fn scan(&self, collection: &str, query: &ScanQuery)
        -> Result<Vec<MetricRecord>, StoreError>;

    /// Sum of `device_pin_value` over the window; `0.0` when nothing matches.
    async fn sum(
        &self,
        collection: &str,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<f64, StoreError> {
        let query = ScanQuery::for_device(device_id).window(window);
        let records = self.scan(collection, &query).await?;
        Ok(records.iter().map(|r| r.device_pin_value).sum())
    }
}

/// Collection names end up in query text for some backends, so only a
/// conservative alphabet is accepted.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}
