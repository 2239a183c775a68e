pub mod cards;
pub mod chart;
pub mod config;
pub mod export;
pub mod http;
pub mod metrics_server;
pub mod observability;
pub mod store;

pub use http::{router, AppState};
