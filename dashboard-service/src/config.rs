use serde::Deserialize;
use std::{collections::HashSet, fs, path::PathBuf};

use telemetry_client::db::validate_collection_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Mongo,
    Pgwire,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// CSV seed for the `memory` store.
    pub seed_csv: Option<PathBuf>,
}

/// Collection backing each summary card.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricRoles {
    #[serde(default = "default_gas_flow")]
    pub gas_flow: String,
    #[serde(default = "default_methane")]
    pub methane: String,
    #[serde(default = "default_battery")]
    pub battery: String,
    #[serde(default = "default_temperature")]
    pub temperature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
    #[serde(default = "default_scan_limit")]
    pub scan_limit: i64,
    #[serde(default = "default_history_days")]
    pub history_days: i64,
    #[serde(default)]
    pub roles: MetricRoles,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_database() -> String {
    "cgf".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_gas_flow() -> String {
    "gas-flow-oc".to_string()
}

fn default_methane() -> String {
    "methane-conc".to_string()
}

fn default_battery() -> String {
    "battery-per".to_string()
}

fn default_temperature() -> String {
    "gas-temp".to_string()
}

fn default_collections() -> Vec<String> {
    ["gas-flow-oc", "gas-temp", "methane-conc", "pressure", "battery-per"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_scan_limit() -> i64 {
    10_000
}

/// A century of history; longer windows are rejected at load time.
pub const MAX_HISTORY_DAYS: i64 = 36_500;

fn default_history_days() -> i64 {
    90
}

fn default_bind_addr() -> String {
    "0.0.0.0:8050".to_string()
}

fn default_page_size() -> usize {
    10
}

impl Default for MetricRoles {
    fn default() -> Self {
        Self {
            gas_flow: default_gas_flow(),
            methane: default_methane(),
            battery: default_battery(),
            temperature: default_temperature(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            collections: default_collections(),
            scan_limit: default_scan_limit(),
            history_days: default_history_days(),
            roles: MetricRoles::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            page_size: default_page_size(),
        }
    }
}

impl MetricRoles {
    pub fn all(&self) -> [&str; 4] {
        [&self.gas_flow, &self.methane, &self.battery, &self.temperature]
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        let mut cfg = Self::from_toml_str(&contents)?;

        // Keeps credentials out of the config file.
        if let Ok(uri) = env::var("DASHBOARD_STORE_URI") {
            cfg.store.uri = uri;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let telemetry = &self.telemetry;
        if telemetry.collections.is_empty() {
            anyhow::bail!("telemetry.collections must name at least one collection");
        }

        let mut columns = HashSet::new();
        for name in telemetry.collections.iter().map(String::as_str).chain(telemetry.roles.all()) {
            validate_collection_name(name)?;
        }
        for name in &telemetry.collections {
            if !columns.insert(name.replace('-', "_")) {
                anyhow::bail!("telemetry.collections lists '{name}' more than once");
            }
        }

        if telemetry.scan_limit <= 0 {
            anyhow::bail!("telemetry.scan_limit must be positive");
        }
        if !(1..=MAX_HISTORY_DAYS).contains(&telemetry.history_days) {
            anyhow::bail!("telemetry.history_days must be between 1 and {MAX_HISTORY_DAYS}");
        }
        if self.http.page_size == 0 {
            anyhow::bail!("http.page_size must be positive");
        }
        if self.store.kind != StoreKind::Memory && self.store.uri.trim().is_empty() {
            anyhow::bail!("store.uri is required for the {:?} store", self.store.kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_dashboard_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            uri = "mongodb://localhost:27017"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.store.kind, StoreKind::Mongo);
        assert_eq!(cfg.store.database, "cgf");
        assert_eq!(cfg.telemetry.collections.len(), 5);
        assert_eq!(cfg.telemetry.history_days, 90);
        assert_eq!(cfg.telemetry.roles.gas_flow, "gas-flow-oc");
        assert_eq!(cfg.http.page_size, 10);
        assert!(cfg.metrics.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn memory_store_needs_no_uri() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            kind = "memory"
            seed_csv = "fixtures/telemetry.csv"

            [telemetry]
            collections = ["gas-flow-oc", "pressure"]
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.store.seed_csv, Some(PathBuf::from("fixtures/telemetry.csv")));
    }

    #[test]
    fn remote_store_without_uri_is_rejected() {
        let cfg = AppConfig::from_toml_str("[store]\nkind = \"pgwire\"\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn colliding_column_names_are_rejected() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            kind = "memory"

            [telemetry]
            collections = ["gas-temp", "gas_temp"]
            "#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn unsafe_collection_names_are_rejected() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            kind = "memory"

            [telemetry]
            collections = ["pressure\"; --"]
            "#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn history_window_is_bounded() {
        let load = |days: i64| {
            AppConfig::from_toml_str(&format!(
                "[store]\nkind = \"memory\"\n\n[telemetry]\nhistory_days = {days}\n"
            ))
            .unwrap()
        };
        load(MAX_HISTORY_DAYS).validate().unwrap();
        assert!(load(0).validate().is_err());
        let err = load(10_000_000).validate().unwrap_err();
        assert!(err.to_string().contains("history_days"), "{err}");
    }
}
