//! Metric Engines
//!
//! Time-anchored derivations over aggregated tables and records:
//! period-over-period growth, launch alignment and trend views.

pub mod launch;
pub mod period;
pub mod trend;

pub use launch::{align_to_launch, period_offset, LaunchRequest, LaunchSeries};
pub use period::{
    compare_snapshots, compare_tables, Growth, GrowthTable, PeriodComparison, PeriodMetricEngine,
    SnapshotComparison,
};
pub use trend::{period_trend, share_of_total, year_mix};
