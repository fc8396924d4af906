//! Core data models: records, aggregate tables and indexed series.

pub mod record;
pub mod series;
pub mod table;

pub use record::{quarter_of_month, Granularity, RawRow, RawValue, Record, RecordFilter};
pub use series::IndexedSeries;
pub use table::{natural_cmp, union_labels, AggregateTable, SnapshotPair};
