use serde::Serialize;
use time::OffsetDateTime;

/// One reading from one metric collection.
///
/// `device_id` and `device_pin_value` are required; documents lacking either
/// are rejected at the store boundary rather than decoded with gaps.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct MetricRecord {
    pub device_id: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub device_pin_value: f64,
    pub device_name: Option<String>,
}

impl MetricRecord {
    pub fn new(device_id: impl Into<String>, timestamp: Option<OffsetDateTime>, value: f64) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            device_pin_value: value,
            device_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}
