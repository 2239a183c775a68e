use serde::Serialize;
use telemetry_client::{aggregate, TelemetryStore};
use time::Date;

use crate::config::MetricRoles;

pub const PLACEHOLDER: &str = "-";
pub const NO_DATA: &str = "no data";

/// Plant efficiency is reported as the live gas flow scaled by this factor.
const PLANT_EFFICIENCY_FACTOR: f64 = 1.2;

/// Text of every summary card on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCards {
    pub plant_efficiency: String,
    pub methane_conc: String,
    pub gas_yesterday: String,
    pub gas_today: String,
    pub live_gas_flow: String,
    pub total_gas: String,
    pub battery_charged: String,
    pub temperature: String,
}

impl SummaryCards {
    pub fn placeholder() -> Self {
        let dash = || PLACEHOLDER.to_string();
        Self {
            plant_efficiency: dash(),
            methane_conc: dash(),
            gas_yesterday: dash(),
            gas_today: dash(),
            live_gas_flow: dash(),
            total_gas: dash(),
            battery_charged: dash(),
            temperature: dash(),
        }
    }
}

fn show(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    value.map(fmt).unwrap_or_else(|| NO_DATA.to_string())
}

fn percent(v: f64) -> String {
    format!("{v:.1}%")
}

fn cubic_meters(v: f64) -> String {
    format!("{v:.2} m³")
}

/// Builds the cards for `device_id`; no query is issued without a device.
pub async fn summary_cards(
    store: &dyn TelemetryStore,
    roles: &MetricRoles,
    device_id: Option<&str>,
    today: Date,
) -> SummaryCards {
    let Some(device_id) = device_id else {
        return SummaryCards::placeholder();
    };

    let collections: Vec<String> = roles.all().iter().map(|c| c.to_string()).collect();
    let latest = aggregate::latest_metrics(store, &collections, device_id).await;
    let latest_value = |collection: &str| latest.get(collection).map(|r| r.device_pin_value);

    let sums = match aggregate::day_sums(store, &roles.gas_flow, device_id, today).await {
        Ok(sums) => Some(sums),
        Err(e) => {
            tracing::warn!(device_id, error = %e, "daily gas sums unavailable");
            None
        }
    };
    let total = match aggregate::total(store, &roles.gas_flow, device_id).await {
        Ok(total) => Some(total),
        Err(e) => {
            tracing::warn!(device_id, error = %e, "total gas unavailable");
            None
        }
    };

    let gas_flow = latest_value(&roles.gas_flow);
    SummaryCards {
        plant_efficiency: show(gas_flow, |v| percent(v * PLANT_EFFICIENCY_FACTOR)),
        methane_conc: show(latest_value(&roles.methane), percent),
        gas_yesterday: show(sums.map(|s| s.yesterday), cubic_meters),
        gas_today: show(sums.map(|s| s.today), cubic_meters),
        live_gas_flow: show(gas_flow, |v| format!("{v:.2}")),
        total_gas: show(total, cubic_meters),
        battery_charged: show(latest_value(&roles.battery), percent),
        temperature: show(latest_value(&roles.temperature), |v| format!("{v:.1}°C")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_client::{
        db::{memory::InjectedFailure, MemoryStore},
        MetricRecord,
    };
    use time::macros::{date, datetime};

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_records(
                "gas-flow-oc",
                vec![
                    MetricRecord::new("D1", Some(datetime!(2030-05-09 06:00:00 UTC)), 2.0),
                    MetricRecord::new("D1", Some(datetime!(2030-05-09 18:00:00 UTC)), 3.0),
                    MetricRecord::new("D1", Some(datetime!(2030-05-10 07:00:00 UTC)), 5.0),
                ],
            )
            .with_records(
                "methane-conc",
                vec![MetricRecord::new("D1", Some(datetime!(2030-05-10 07:00:00 UTC)), 61.27)],
            )
            .with_records(
                "gas-temp",
                vec![MetricRecord::new("D1", Some(datetime!(2030-05-10 07:00:00 UTC)), 34.04)],
            )
    }

    #[tokio::test]
    async fn cards_format_latest_values_and_sums() {
        let cards = summary_cards(&store(), &MetricRoles::default(), Some("D1"), date!(2030 - 05 - 10)).await;

        assert_eq!(cards.plant_efficiency, "6.0%");
        assert_eq!(cards.methane_conc, "61.3%");
        assert_eq!(cards.gas_yesterday, "5.00 m³");
        assert_eq!(cards.gas_today, "5.00 m³");
        assert_eq!(cards.live_gas_flow, "5.00");
        assert_eq!(cards.total_gas, "10.00 m³");
        assert_eq!(cards.temperature, "34.0°C");
    }

    #[tokio::test]
    async fn missing_metric_reads_no_data_not_zero() {
        let cards = summary_cards(&store(), &MetricRoles::default(), Some("D1"), date!(2030 - 05 - 10)).await;
        assert_eq!(cards.battery_charged, NO_DATA);
    }

    #[tokio::test]
    async fn no_device_shows_placeholders() {
        let cards = summary_cards(&store(), &MetricRoles::default(), None, date!(2030 - 05 - 10)).await;
        assert_eq!(cards, SummaryCards::placeholder());
    }

    #[tokio::test]
    async fn failing_gas_flow_degrades_to_no_data() {
        let store = store().with_failure("gas-flow-oc", InjectedFailure::Query);
        let cards = summary_cards(&store, &MetricRoles::default(), Some("D1"), date!(2030 - 05 - 10)).await;
        assert_eq!(cards.gas_today, NO_DATA);
        assert_eq!(cards.total_gas, NO_DATA);
        assert_eq!(cards.live_gas_flow, NO_DATA);
        assert_eq!(cards.methane_conc, "61.3%");
    }
}
