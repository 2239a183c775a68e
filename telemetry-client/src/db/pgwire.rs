use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use super::{validate_collection_name, ScanQuery, SortOrder, StoreError, TelemetryStore, TimeWindow};
use crate::domain::MetricRecord;

/// Postgres-wire backend (QuestDB or Postgres).
///
/// Each metric collection is a table of the same name with the columns
/// `device_id`, `timestamp`, `device_pin_value` and `device_name`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn table(collection: &str) -> Result<String, StoreError> {
    validate_collection_name(collection)?;
    Ok(format!("\"{collection}\""))
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, device_id: &str, window: TimeWindow) {
    builder.push(" WHERE device_id = ");
    builder.push_bind(device_id.to_string());
    if let Some(start) = window.start {
        builder.push(" AND \"timestamp\" >= ");
        builder.push_bind(start);
    }
    if let Some(end) = window.end {
        builder.push(" AND \"timestamp\" < ");
        builder.push_bind(end);
    }
}

fn classify(collection: &str, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(e.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode {
                collection: collection.to_string(),
                reason: e.to_string(),
            }
        }
        _ => StoreError::Query {
            collection: collection.to_string(),
            message: e.to_string(),
        },
    }
}

#[async_trait::async_trait]
impl TelemetryStore for PgStore {
    async fn distinct_device_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT DISTINCT device_id FROM ");
        builder.push(table(collection)?);

        builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(collection, e))
    }

    async fn scan(
        &self,
        collection: &str,
        query: &ScanQuery,
    ) -> Result<Vec<MetricRecord>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT device_id, \"timestamp\", device_pin_value, device_name FROM ",
        );
        builder.push(table(collection)?);
        push_filter(&mut builder, &query.device_id, query.window);

        builder.push(match query.order {
            SortOrder::Ascending => " ORDER BY \"timestamp\" ASC",
            SortOrder::Descending => " ORDER BY \"timestamp\" DESC",
        });
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        builder
            .build_query_as::<MetricRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(collection, e))
    }

    async fn sum(
        &self,
        collection: &str,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<f64, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT SUM(device_pin_value) FROM ");
        builder.push(table(collection)?);
        push_filter(&mut builder, device_id, window);

        let total: Option<f64> = builder
            .build_query_scalar::<Option<f64>>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(collection, e))?;

        Ok(total.unwrap_or(0.0))
    }
}
