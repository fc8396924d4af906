//! Period-over-Period Metrics
//!
//! Difference and percentage growth between aligned snapshots, or between
//! consecutive period columns of a single table.
//!
//! Zero-baseline policy: growth from 0 to a positive value is `Growth::New`
//! (reported as +100%), from 0 to anything else is 0%. Never NaN or inf.

use crate::config::EngineConfig;
use crate::core::engine::pivot::{order_rows, SortPolicy};
use crate::core::models::{AggregateTable, SnapshotPair};
use crate::error::Result;
use serde::{Serialize, Serializer};
use tracing::debug;

/// Percentage growth of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    Pct(f64),

    /// Zero baseline, positive current value
    New,
}

impl Growth {
    pub fn between(prev: f64, curr: f64) -> Self {
        if prev == 0.0 {
            if curr > 0.0 {
                Growth::New
            } else {
                Growth::Pct(0.0)
            }
        } else {
            Growth::Pct((curr - prev) / prev * 100.0)
        }
    }

    /// Numeric percentage; `New` counts as +100%
    pub fn as_percent(&self) -> f64 {
        match self {
            Growth::Pct(p) => *p,
            Growth::New => 100.0,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Growth::New)
    }
}

impl Serialize for Growth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Growth::Pct(p) => serializer.serialize_f64(*p),
            Growth::New => serializer.serialize_str("New"),
        }
    }
}

/// Growth values over the same labels as the value tables they came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthTable {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub values: Vec<Vec<Growth>>,
}

impl GrowthTable {
    fn between(prev: &AggregateTable, curr: &AggregateTable) -> Result<Self> {
        let prev = prev.align_to(curr)?;
        let values = curr
            .values()
            .iter()
            .zip(prev.values().iter())
            .map(|(c, p)| c.iter().zip(p.iter()).map(|(c, p)| Growth::between(*p, *c)).collect())
            .collect();
        Ok(Self {
            row_labels: curr.row_labels().to_vec(),
            col_labels: curr.col_labels().to_vec(),
            values,
        })
    }

    pub fn get(&self, row: &str, col: &str) -> Option<Growth> {
        let i = self.row_labels.iter().position(|l| l == row)?;
        let j = self.col_labels.iter().position(|l| l == col)?;
        Some(self.values[i][j])
    }

    /// Numeric view, `New` rendered as 100
    pub fn to_percent_table(&self) -> Result<AggregateTable> {
        AggregateTable::from_rows(
            self.row_labels.clone(),
            self.col_labels.clone(),
            self.values
                .iter()
                .map(|row| row.iter().map(Growth::as_percent).collect())
                .collect(),
        )
    }

    fn reindex_rows(&self, order: &[String]) -> Self {
        let values = order
            .iter()
            .filter_map(|l| self.row_labels.iter().position(|r| r == l))
            .map(|i| self.values[i].clone())
            .collect();
        Self {
            row_labels: order.to_vec(),
            col_labels: self.col_labels.clone(),
            values,
        }
    }
}

/// Element-wise comparison of a snapshot pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotComparison {
    /// new - old
    pub diff: AggregateTable,
    pub growth: GrowthTable,
}

/// Compare two snapshots cell by cell
///
/// Total cells are compared as values in their own right, not re-summed
/// from the per-row differences.
pub fn compare_snapshots(pair: &SnapshotPair) -> Result<SnapshotComparison> {
    compare_tables(&pair.old, &pair.new)
}

/// Compare two tables that must already share label sets
pub fn compare_tables(old: &AggregateTable, new: &AggregateTable) -> Result<SnapshotComparison> {
    let diff = new.zip_with(old, |n, o| n - o)?;
    let growth = GrowthTable::between(old, new)?;
    Ok(SnapshotComparison { diff, growth })
}

/// Metrics across the period columns of one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    /// Source values, periods only, rows in presentation order
    pub values: AggregateTable,

    /// Change from the previous period; the first period is 0
    pub diff: AggregateTable,

    /// Growth from the previous period; the first period is 0%
    pub growth: GrowthTable,
}

pub struct PeriodMetricEngine<'a> {
    config: &'a EngineConfig,
}

impl<'a> PeriodMetricEngine<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Diff and growth between consecutive period columns
    ///
    /// Columns are taken as periods in their current order; a Total column
    /// is not a period and is dropped. Rows are ordered by the latest
    /// period, descending, with the Total row first.
    pub fn period_over_period(&self, table: &AggregateTable) -> Result<PeriodComparison> {
        let total = self.config.total_label.as_str();

        // Step 1: Period columns only
        let periods: Vec<String> = table.col_labels().iter().filter(|c| *c != total).cloned().collect();
        let values = table.reindex_columns(&periods)?;

        // Step 2: Consecutive differences
        let mut diff = AggregateTable::zeros(values.row_labels().to_vec(), periods.clone())?;
        let mut growth_values = Vec::with_capacity(values.n_rows());
        for (i, row) in values.values().iter().enumerate() {
            let mut growth_row = Vec::with_capacity(row.len());
            for (j, curr) in row.iter().enumerate() {
                if j == 0 {
                    growth_row.push(Growth::Pct(0.0));
                    continue;
                }
                let prev = row[j - 1];
                diff.set_at(i, j, curr - prev);
                growth_row.push(Growth::between(prev, *curr));
            }
            growth_values.push(growth_row);
        }
        let growth = GrowthTable {
            row_labels: values.row_labels().to_vec(),
            col_labels: periods,
            values: growth_values,
        };

        // Step 3: Presentation order
        let order = SortPolicy::by_latest().row_order(&values, total);
        debug!("period-over-period over {} period(s)", values.n_cols());
        Ok(PeriodComparison {
            values: values.reindex_rows(&order)?,
            diff: diff.reindex_rows(&order)?,
            growth: growth.reindex_rows(&order),
        })
    }

    /// Compare each table in a sequence with its predecessor
    ///
    /// All tables must share label sets; the first entry compares the first
    /// table with itself (zero diff, 0% growth).
    pub fn sequence_metrics(&self, tables: &[AggregateTable]) -> Result<Vec<SnapshotComparison>> {
        let first = match tables.first() {
            Some(t) => t,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::with_capacity(tables.len());
        out.push(SnapshotComparison {
            diff: first.map(|_| 0.0),
            growth: GrowthTable {
                row_labels: first.row_labels().to_vec(),
                col_labels: first.col_labels().to_vec(),
                values: vec![vec![Growth::Pct(0.0); first.n_cols()]; first.n_rows()],
            },
        });
        for window in tables.windows(2) {
            let prev = window[0].align_to(first)?;
            let curr = window[1].align_to(first)?;
            out.push(compare_tables(&prev, &curr)?);
        }
        Ok(out)
    }

    /// Rank a comparison's rows by the new snapshot's latest column
    pub fn ranked(&self, pair: &SnapshotPair, comparison: &SnapshotComparison) -> Result<SnapshotComparison> {
        let total = self.config.total_label.as_str();
        let ranked = order_rows(&pair.new, &SortPolicy::by_latest(), total)?;
        let order = ranked.row_labels().to_vec();
        Ok(SnapshotComparison {
            diff: comparison.diff.reindex_rows(&order)?,
            growth: comparison.growth.reindex_rows(&order),
        })
    }
}
