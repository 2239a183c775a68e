pub mod merged_table;
pub mod metric_record;

pub use merged_table::{Cell, JoinKey, MergedRow, MergedTable};
pub use metric_record::MetricRecord;
