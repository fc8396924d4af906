//! Aggregation Reconciliation
//!
//! Proves that the Total row and column of a table agree with its data
//! cells, and that a comparison's Total diff agrees with the sum of the
//! per-row diffs. Both checks pass within a precision tolerance.

use crate::core::metrics::SnapshotComparison;
use crate::core::models::AggregateTable;
use crate::error::{IntelError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Conservation check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConservationReport {
    /// Largest |Total column - sum of the row's data cells|
    pub row_total_error: f64,

    /// Largest |Total row - sum of the column's data cells|
    pub column_total_error: f64,

    /// |grand total - sum of all data cells|
    pub grand_total_error: f64,

    /// Whether every error is within tolerance
    pub passes: bool,
}

/// Total diff cross-check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalDiffReport {
    /// Total row diff per column, as derived directly from the totals
    pub reported: Vec<f64>,

    /// Sum of the per-row diffs per column
    pub calculated: Vec<f64>,

    /// Largest absolute disagreement
    pub reconciliation_error: f64,

    pub passes: bool,
}

/// Aggregate reconciliation engine
pub struct AggregateReconciliationEngine {
    /// Precision tolerance for reconciliation
    pub precision: u32,

    pub total_label: String,
}

impl AggregateReconciliationEngine {
    pub fn new(precision: u32, total_label: impl Into<String>) -> Self {
        Self {
            precision,
            total_label: total_label.into(),
        }
    }

    fn threshold(&self) -> f64 {
        1.0 / 10_f64.powi(self.precision as i32)
    }

    /// Check row-total, column-total and grand-total conservation
    ///
    /// The table must carry both a Total row and a Total column.
    pub fn check_conservation(&self, table: &AggregateTable) -> Result<ConservationReport> {
        let total = self.total_label.as_str();
        let (ti, tj) = match (table.row_position(total), table.col_position(total)) {
            (Some(i), Some(j)) => (i, j),
            _ => {
                return Err(IntelError::schema_mismatch(
                    "conservation check",
                    vec![format!("{} row and column", total)],
                ))
            }
        };

        let mut row_total_error: f64 = 0.0;
        let mut column_total_error: f64 = 0.0;
        let mut grand = 0.0;
        for i in 0..table.n_rows() {
            let mut sum = 0.0;
            for j in 0..table.n_cols() {
                if j != tj {
                    sum += table.value_at(i, j);
                }
            }
            row_total_error = row_total_error.max((table.value_at(i, tj) - sum).abs());
            if i != ti {
                grand += sum;
            }
        }
        for j in 0..table.n_cols() {
            let sum: f64 = (0..table.n_rows()).filter(|i| *i != ti).map(|i| table.value_at(i, j)).sum();
            column_total_error = column_total_error.max((table.value_at(ti, j) - sum).abs());
        }
        let grand_total_error = (table.value_at(ti, tj) - grand).abs();

        let threshold = self.threshold();
        let passes = row_total_error <= threshold && column_total_error <= threshold && grand_total_error <= threshold;
        if !passes {
            warn!(
                "conservation check failed: row {} column {} grand {}",
                row_total_error, column_total_error, grand_total_error
            );
        }
        Ok(ConservationReport {
            row_total_error,
            column_total_error,
            grand_total_error,
            passes,
        })
    }

    /// Cross-check the directly derived Total row diff against the per-row diffs
    pub fn check_total_diff(&self, comparison: &SnapshotComparison) -> Result<TotalDiffReport> {
        let total = self.total_label.as_str();
        let diff = &comparison.diff;
        let reported = match diff.row_values(total) {
            Some(values) => values.to_vec(),
            None => {
                return Err(IntelError::schema_mismatch(
                    "total diff check",
                    vec![format!("{} row", total)],
                ))
            }
        };

        let ti = diff.row_position(total).unwrap_or_default();
        let calculated: Vec<f64> = (0..diff.n_cols())
            .map(|j| (0..diff.n_rows()).filter(|i| *i != ti).map(|i| diff.value_at(i, j)).sum())
            .collect();
        let reconciliation_error = reported
            .iter()
            .zip(calculated.iter())
            .map(|(r, c)| (r - c).abs())
            .fold(0.0, f64::max);

        Ok(TotalDiffReport {
            passes: reconciliation_error <= self.threshold(),
            reported,
            calculated,
            reconciliation_error,
        })
    }
}

/// Convenience wrapper using the default "Total" label
pub fn check_conservation(table: &AggregateTable, precision: u32) -> Result<ConservationReport> {
    AggregateReconciliationEngine::new(precision, "Total").check_conservation(table)
}

/// Convenience wrapper using the default "Total" label
pub fn check_total_diff(comparison: &SnapshotComparison, precision: u32) -> Result<TotalDiffReport> {
    AggregateReconciliationEngine::new(precision, "Total").check_total_diff(comparison)
}
