use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson, Document},
    error::ErrorKind,
    options::FindOptions,
    Client, Collection, Database,
};
use time::OffsetDateTime;

use super::{validate_collection_name, ScanQuery, SortOrder, StoreError, TelemetryStore, TimeWindow};
use crate::domain::MetricRecord;

/// MongoDB backend; one document collection per metric.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Builds the client. The driver connects lazily, so an unreachable
    /// cluster only surfaces on [`ping`](Self::ping) or the first query.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            db: client.database(database),
        })
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map(|_| ())
            .map_err(|e| classify("admin", e))
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>, StoreError> {
        validate_collection_name(name)?;
        Ok(self.db.collection::<Document>(name))
    }
}

fn classify(collection: &str, e: mongodb::error::Error) -> StoreError {
    match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => StoreError::Connection(e.to_string()),
        ErrorKind::BsonDeserialization(_) => StoreError::Decode {
            collection: collection.to_string(),
            reason: e.to_string(),
        },
        _ => StoreError::Query {
            collection: collection.to_string(),
            message: e.to_string(),
        },
    }
}

fn to_bson_datetime(ts: OffsetDateTime) -> bson::DateTime {
    bson::DateTime::from_millis((ts.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn from_bson_datetime(dt: bson::DateTime) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(dt.timestamp_millis()) * 1_000_000).ok()
}

fn device_filter(device_id: &str, window: TimeWindow) -> Document {
    let mut filter = doc! { "device_id": device_id };
    let mut range = Document::new();
    if let Some(start) = window.start {
        range.insert("$gte", to_bson_datetime(start));
    }
    if let Some(end) = window.end {
        range.insert("$lt", to_bson_datetime(end));
    }
    if !range.is_empty() {
        filter.insert("timestamp", range);
    }
    filter
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

/// Decodes one stored document into a [`MetricRecord`].
///
/// Required: `device_id` (string), `device_pin_value` (number).
/// Optional: `timestamp` (datetime), `device_name` (string). `_id` and any
/// other fields are ignored.
pub fn decode_document(
    collection: &str,
    index: usize,
    doc: &Document,
) -> Result<MetricRecord, StoreError> {
    let fail = |reason: String| StoreError::Decode {
        collection: collection.to_string(),
        reason: format!("document {index}: {reason}"),
    };

    let device_id = match doc.get("device_id") {
        Some(Bson::String(s)) => s.clone(),
        Some(other) => {
            return Err(fail(format!(
                "field 'device_id' has type {:?}, expected a string",
                other.element_type()
            )))
        }
        None => return Err(fail("missing required field 'device_id'".to_string())),
    };

    let device_pin_value = match doc.get("device_pin_value") {
        Some(v) => as_f64(v).ok_or_else(|| {
            fail(format!(
                "field 'device_pin_value' has type {:?}, expected a number",
                v.element_type()
            ))
        })?,
        None => return Err(fail("missing required field 'device_pin_value'".to_string())),
    };

    let timestamp = match doc.get("timestamp") {
        None | Some(Bson::Null) => None,
        Some(Bson::DateTime(dt)) => Some(
            from_bson_datetime(*dt)
                .ok_or_else(|| fail(format!("field 'timestamp' out of range: {dt}")))?,
        ),
        Some(other) => {
            return Err(fail(format!(
                "field 'timestamp' has type {:?}, expected a datetime",
                other.element_type()
            )))
        }
    };

    let device_name = match doc.get("device_name") {
        None | Some(Bson::Null) => None,
        Some(Bson::String(s)) => Some(s.clone()),
        Some(other) => {
            return Err(fail(format!(
                "field 'device_name' has type {:?}, expected a string",
                other.element_type()
            )))
        }
    };

    Ok(MetricRecord {
        device_id,
        timestamp,
        device_pin_value,
        device_name,
    })
}

#[async_trait::async_trait]
impl TelemetryStore for MongoStore {
    async fn distinct_device_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let values = self
            .collection(collection)?
            .distinct("device_id", None, None)
            .await
            .map_err(|e| classify(collection, e))?;

        values
            .into_iter()
            .map(|v| match v {
                Bson::String(s) => Ok(s),
                other => Err(StoreError::Decode {
                    collection: collection.to_string(),
                    reason: format!("device_id of type {:?}, expected a string", other.element_type()),
                }),
            })
            .collect()
    }

    async fn scan(
        &self,
        collection: &str,
        query: &ScanQuery,
    ) -> Result<Vec<MetricRecord>, StoreError> {
        let mut options = FindOptions::default();
        options.sort = Some(match query.order {
            SortOrder::Ascending => doc! { "timestamp": 1 },
            SortOrder::Descending => doc! { "timestamp": -1 },
        });
        options.limit = query.limit;

        let docs: Vec<Document> = self
            .collection(collection)?
            .find(device_filter(&query.device_id, query.window), options)
            .await
            .map_err(|e| classify(collection, e))?
            .try_collect()
            .await
            .map_err(|e| classify(collection, e))?;

        docs.iter()
            .enumerate()
            .map(|(i, d)| decode_document(collection, i, d))
            .collect()
    }

    async fn sum(
        &self,
        collection: &str,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<f64, StoreError> {
        let pipeline = vec![
            doc! { "$match": device_filter(device_id, window) },
            doc! { "$group": { "_id": null, "value": { "$sum": "$device_pin_value" } } },
        ];

        let mut cursor = self
            .collection(collection)?
            .aggregate(pipeline, None)
            .await
            .map_err(|e| classify(collection, e))?;

        let Some(group) = cursor.try_next().await.map_err(|e| classify(collection, e))? else {
            return Ok(0.0);
        };

        match group.get("value") {
            Some(v) => as_f64(v).ok_or_else(|| StoreError::Decode {
                collection: collection.to_string(),
                reason: format!("sum of type {:?}, expected a number", v.element_type()),
            }),
            None => Ok(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn decodes_full_document() {
        let ts = datetime!(2030-03-01 12:00:00 UTC);
        let doc = doc! {
            "_id": "abc",
            "device_id": "D1",
            "timestamp": to_bson_datetime(ts),
            "device_pin_value": 4.5,
            "device_name": "digester-1",
        };
        let record = decode_document("gas-flow-oc", 0, &doc).unwrap();
        assert_eq!(record.device_id, "D1");
        assert_eq!(record.timestamp, Some(ts));
        assert_eq!(record.device_pin_value, 4.5);
        assert_eq!(record.device_name.as_deref(), Some("digester-1"));
    }

    #[test]
    fn integer_values_are_numeric() {
        let doc = doc! { "device_id": "D1", "device_pin_value": 7_i64 };
        let record = decode_document("pressure", 0, &doc).unwrap();
        assert_eq!(record.device_pin_value, 7.0);
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn missing_value_fails_with_field_name() {
        let doc = doc! { "device_id": "D1" };
        let err = decode_document("pressure", 3, &doc).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pressure"), "{msg}");
        assert!(msg.contains("document 3"), "{msg}");
        assert!(msg.contains("device_pin_value"), "{msg}");
    }

    #[test]
    fn string_value_is_rejected() {
        let doc = doc! { "device_id": "D1", "device_pin_value": "12" };
        assert!(matches!(
            decode_document("pressure", 0, &doc),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn window_becomes_timestamp_range() {
        let start = datetime!(2030-01-01 00:00:00 UTC);
        let filter = device_filter("D1", TimeWindow::since(start));
        let range = filter.get_document("timestamp").unwrap();
        assert_eq!(range.get_datetime("$gte").unwrap(), &to_bson_datetime(start));
        assert!(range.get("$lt").is_none());

        let unbounded = device_filter("D1", TimeWindow::all());
        assert!(unbounded.get("timestamp").is_none());
    }

    #[test]
    fn datetime_conversion_is_millisecond_exact() {
        let ts = datetime!(2030-06-15 08:30:00.250 UTC);
        assert_eq!(from_bson_datetime(to_bson_datetime(ts)), Some(ts));
    }
}
