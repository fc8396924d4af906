//! Long-Tail Consolidation
//!
//! Folds low-volume rows into a synthetic Others bucket, column by column.
//! Membership is decided once from the baseline (old) snapshot and applied
//! to both snapshots at the same coordinates.

use crate::config::EngineConfig;
use crate::core::models::{AggregateTable, SnapshotPair};
use crate::error::Result;
use tracing::debug;

pub struct LongTailConsolidator<'a> {
    config: &'a EngineConfig,
}

impl<'a> LongTailConsolidator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Move every (row, column) whose baseline value is strictly below
    /// `threshold` into the Others row, in both snapshots
    ///
    /// The snapshots must share label sets (`ShapeMismatch` otherwise).
    /// Totals present on the input are discarded and recomputed.
    pub fn consolidate_others(&self, old: &AggregateTable, new: &AggregateTable, threshold: f64) -> Result<SnapshotPair> {
        let total = self.config.total_label.as_str();
        let others = self.config.others_label.as_str();
        let had_totals = old.has_totals(total) || new.has_totals(total);

        // Step 1: Shape alignment on the data cells
        let mut old_t = old.without_totals(total).with_row(others);
        let mut new_t = new.without_totals(total).with_row(others).align_to(&old_t)?;

        // Step 2: Baseline-decided moves, per column
        let others_idx = old_t.row_position(others).unwrap_or_default();
        let mut moved = 0usize;
        for j in 0..old_t.n_cols() {
            for i in 0..old_t.n_rows() {
                if i == others_idx {
                    continue;
                }
                let baseline = old_t.value_at(i, j);
                if baseline < threshold {
                    let current = new_t.value_at(i, j);
                    old_t.add_at(others_idx, j, baseline);
                    old_t.set_at(i, j, 0.0);
                    new_t.add_at(others_idx, j, current);
                    new_t.set_at(i, j, 0.0);
                    moved += 1;
                }
            }
        }
        debug!("consolidated {} cell(s) below {} into '{}'", moved, threshold, others);

        // Step 3: Fresh totals
        if had_totals {
            old_t = old_t.with_totals(total);
            new_t = new_t.with_totals(total);
        }
        Ok(SnapshotPair { old: old_t, new: new_t })
    }

    /// Fixed-layout view with residual Others
    ///
    /// Adds a Total column (row sums), an Others column (Total minus the
    /// tracked columns) and an Others row (the Total row minus the tracked
    /// rows), then reindexes both axes to `[Total, tracked..., Others]`.
    /// A reported Total row in the input is used as-is; without one the
    /// Total row is the sum of all rows.
    pub fn residual_others(&self, table: &AggregateTable, tracked_rows: &[String], tracked_cols: &[String]) -> Result<AggregateTable> {
        let total = self.config.total_label.as_str();
        let others = self.config.others_label.as_str();

        // Step 1: Total column over the data columns
        let body = drop_column(table, total)?;
        let reported_total = body.row_values(total).map(|r| r.to_vec());
        let data_rows: Vec<String> = body
            .row_labels()
            .iter()
            .filter(|r| *r != total)
            .cloned()
            .collect();

        let mut cols: Vec<String> = body.col_labels().to_vec();
        cols.retain(|c| c != others);
        let mut rows: Vec<(String, Vec<f64>)> = Vec::new();
        for label in &data_rows {
            rows.push((label.clone(), with_residual(&body, label, &cols, tracked_cols)));
        }

        // Step 2: Total row, reported or summed
        let total_row = match reported_total {
            Some(values) => {
                let reported = AggregateTable::from_rows(vec![total.to_string()], body.col_labels().to_vec(), vec![values])?;
                with_residual(&reported, total, &cols, tracked_cols)
            }
            None => {
                let width = cols.len() + 2;
                let mut sums = vec![0.0; width];
                for (_, values) in &rows {
                    for (k, v) in values.iter().enumerate() {
                        sums[k] += v;
                    }
                }
                sums
            }
        };

        // Step 3: Others row as the residual of the tracked rows
        let mut others_row = total_row.clone();
        for (label, values) in &rows {
            if tracked_rows.contains(label) {
                for (k, v) in values.iter().enumerate() {
                    others_row[k] -= v;
                }
            }
        }

        let mut out_cols = cols.clone();
        out_cols.push(total.to_string());
        out_cols.push(others.to_string());
        let mut out_rows: Vec<String> = rows.iter().map(|(l, _)| l.clone()).filter(|l| l != others).collect();
        let mut values: Vec<Vec<f64>> = rows
            .into_iter()
            .filter(|(l, _)| l != others)
            .map(|(_, v)| v)
            .collect();
        out_rows.push(total.to_string());
        values.push(total_row);
        out_rows.push(others.to_string());
        values.push(others_row);
        let full = AggregateTable::from_rows(out_rows, out_cols, values)?;

        // Step 4: Fixed layout
        let final_rows = layout(total, tracked_rows, others);
        let final_cols = layout(total, tracked_cols, others);
        full.reindex(&final_rows, &final_cols)
    }
}

/// Convenience wrapper returning the consolidated (old, new) tables
pub fn consolidate_others(
    old: &AggregateTable,
    new: &AggregateTable,
    threshold: f64,
    config: &EngineConfig,
) -> Result<(AggregateTable, AggregateTable)> {
    let pair = LongTailConsolidator::new(config).consolidate_others(old, new, threshold)?;
    Ok((pair.old, pair.new))
}

/// Convenience wrapper around `LongTailConsolidator::residual_others`
pub fn residual_others(
    table: &AggregateTable,
    tracked_rows: &[String],
    tracked_cols: &[String],
    config: &EngineConfig,
) -> Result<AggregateTable> {
    LongTailConsolidator::new(config).residual_others(table, tracked_rows, tracked_cols)
}

fn drop_column(table: &AggregateTable, label: &str) -> Result<AggregateTable> {
    let keep: Vec<String> = table.col_labels().iter().filter(|c| *c != label).cloned().collect();
    table.reindex_columns(&keep)
}

/// Row values over `cols`, followed by the row total and the residual
/// of the untracked columns
fn with_residual(table: &AggregateTable, row: &str, cols: &[String], tracked_cols: &[String]) -> Vec<f64> {
    let mut values: Vec<f64> = cols.iter().map(|c| table.get(row, c).unwrap_or(0.0)).collect();
    let row_total: f64 = table.row_values(row).map(|r| r.iter().sum()).unwrap_or(0.0);
    let tracked: f64 = cols
        .iter()
        .zip(values.iter())
        .filter(|(c, _)| tracked_cols.contains(c))
        .map(|(_, v)| *v)
        .sum();
    values.push(row_total);
    values.push(row_total - tracked);
    values
}

fn layout(total: &str, tracked: &[String], others: &str) -> Vec<String> {
    let mut out = vec![total.to_string()];
    out.extend(tracked.iter().filter(|l| *l != total && *l != others).cloned());
    out.push(others.to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_baseline_decides_membership() {
        let config = EngineConfig::default();
        let old = AggregateTable::from_rows(
            labels(&["A", "B"]),
            labels(&["US"]),
            vec![vec![900_000.0], vec![5_000_000.0]],
        )
        .unwrap();
        let new = AggregateTable::from_rows(
            labels(&["A", "B"]),
            labels(&["US"]),
            vec![vec![1_200_000.0], vec![4_000_000.0]],
        )
        .unwrap();

        let (old_c, new_c) = consolidate_others(&old, &new, 1_000_000.0, &config).unwrap();
        assert_eq!(old_c.get("A", "US"), Some(0.0));
        assert_eq!(new_c.get("A", "US"), Some(0.0));
        assert_eq!(old_c.get("Others", "US"), Some(900_000.0));
        assert_eq!(new_c.get("Others", "US"), Some(1_200_000.0));
        assert_eq!(new_c.get("B", "US"), Some(4_000_000.0));
        assert_eq!(old_c.sum_excluding("Total"), old.sum_excluding("Total"));
        assert_eq!(new_c.sum_excluding("Total"), new.sum_excluding("Total"));
    }

    #[test]
    fn test_existing_others_and_totals() {
        let config = EngineConfig::default();
        let old = AggregateTable::from_rows(
            labels(&["A", "Others"]),
            labels(&["US", "China"]),
            vec![vec![10.0, 2_000_000.0], vec![5.0, 5.0]],
        )
        .unwrap()
        .with_totals("Total");
        let new = old.clone();

        let pair = LongTailConsolidator::new(&config)
            .consolidate_others(&old, &new, 1_000_000.0)
            .unwrap();
        assert_eq!(pair.old.get("Others", "US"), Some(15.0));
        assert_eq!(pair.old.get("A", "China"), Some(2_000_000.0));
        assert_eq!(pair.old.get("Total", "Total"), Some(2_000_020.0));
        assert_eq!(pair.old.get("A", "Total"), Some(2_000_000.0));
        assert_eq!(pair.old.get("Others", "Total"), Some(20.0));
    }

    #[test]
    fn test_ragged_snapshots_rejected() {
        let config = EngineConfig::default();
        let old = AggregateTable::zeros(labels(&["A"]), labels(&["US"])).unwrap();
        let new = AggregateTable::zeros(labels(&["B"]), labels(&["US"])).unwrap();
        assert!(consolidate_others(&old, &new, 1.0, &config).is_err());
    }

    #[test]
    fn test_residual_others_with_reported_total() {
        let config = EngineConfig::default();
        let table = AggregateTable::from_rows(
            labels(&["China", "US", "Total", "Korea"]),
            labels(&["Apple", "MX", "Sony"]),
            vec![
                vec![10.0, 20.0, 1.0],
                vec![30.0, 5.0, 0.0],
                vec![50.0, 30.0, 4.0],
                vec![10.0, 5.0, 3.0],
            ],
        )
        .unwrap();
        let out = residual_others(
            &table,
            &labels(&["China", "India", "US"]),
            &labels(&["Apple", "MX", "Xiaomi"]),
            &config,
        )
        .unwrap();

        assert_eq!(out.row_labels(), &labels(&["Total", "China", "India", "US", "Others"])[..]);
        assert_eq!(out.col_labels(), &labels(&["Total", "Apple", "MX", "Xiaomi", "Others"])[..]);
        assert_eq!(out.get("China", "Total"), Some(31.0));
        assert_eq!(out.get("China", "Others"), Some(1.0));
        assert_eq!(out.get("India", "Apple"), Some(0.0));
        assert_eq!(out.get("Total", "Total"), Some(84.0));
        assert_eq!(out.get("Others", "Apple"), Some(10.0));
        assert_eq!(out.get("Others", "Others"), Some(3.0));
    }
}
