pub mod aggregate;
pub mod db;
pub mod domain;
pub mod merge;

pub use db::{ScanQuery, SortOrder, StoreError, TelemetryStore, TimeWindow};
pub use domain::{Cell, JoinKey, MergedRow, MergedTable, MetricRecord};
pub use merge::{CollectionOutcome, CollectionReport, MergeError, MergeReport, TelemetryMerger};
