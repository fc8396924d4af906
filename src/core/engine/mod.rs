//! Core Engine Module
//!
//! Contains the canonicalization, diff, pivot, consolidation and
//! reconciliation engines.

pub mod aggregate_reconcile;
pub mod canonicalize;
pub mod consolidate;
pub mod pivot;
pub mod row_diff;

pub use aggregate_reconcile::{
    check_conservation, check_total_diff, AggregateReconciliationEngine, ConservationReport, TotalDiffReport,
};
pub use canonicalize::{ColumnMapping, NormalizeReport, Normalized, RecordCanonicalizer};
pub use consolidate::{consolidate_others, residual_others, LongTailConsolidator};
pub use pivot::{order_columns, order_rows, pin, pivot, Aggregation, PivotAggregator, PivotField, PivotSpec, SortPolicy};
pub use row_diff::{diff, ChangedRow, DiffOptions, DiffReport, DiffRow, DiffSummary, RowDiffEngine, RowTable};
