//! Comparison export layouts
//!
//! Shapes a previous/current pair into the flat grids analysts paste into
//! reports. Values stay in raw units.

use crate::config::EngineConfig;
use crate::core::engine::pivot::{order_columns, order_rows, SortPolicy};
use crate::core::models::AggregateTable;
use crate::error::Result;

/// Interleave two snapshots column-wise
///
/// Both tables are transposed, so the output rows are the former columns.
/// Each former row label `L` yields three columns: `L | prev_label`,
/// `L | curr_label` and `L | Diff` (current minus previous). The tables must
/// carry the same labels.
pub fn side_by_side(
    prev: &AggregateTable,
    curr: &AggregateTable,
    prev_label: &str,
    curr_label: &str,
    config: &EngineConfig,
) -> Result<AggregateTable> {
    let curr = curr.align_to(prev)?;
    let prev_t = prev.transpose();
    let curr_t = curr.transpose();
    let sep = config.label_separator.as_str();

    let mut cols = Vec::with_capacity(prev_t.n_cols() * 3);
    for label in prev_t.col_labels() {
        cols.push(format!("{}{}{}", label, sep, prev_label));
        cols.push(format!("{}{}{}", label, sep, curr_label));
        cols.push(format!("{}{}Diff", label, sep));
    }

    let values = prev_t
        .values()
        .iter()
        .zip(curr_t.values().iter())
        .map(|(p_row, c_row)| {
            p_row
                .iter()
                .zip(c_row.iter())
                .flat_map(|(p, c)| [*p, *c, c - p])
                .collect()
        })
        .collect();
    AggregateTable::from_rows(prev_t.row_labels().to_vec(), cols, values)
}

/// Reorder both axes to preferred label lists; unlisted labels follow in
/// natural order and listed labels the table lacks are skipped
pub fn explicit_layout(table: &AggregateTable, rows: &[String], cols: &[String]) -> Result<AggregateTable> {
    let by_rows = order_rows(table, &SortPolicy::Explicit(rows.to_vec()), "")?;
    order_columns(&by_rows, &SortPolicy::Explicit(cols.to_vec()), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_side_by_side_interleaves() {
        let config = EngineConfig::default();
        let prev = AggregateTable::from_rows(
            labels(&["Apple", "Samsung"]),
            labels(&["US"]),
            vec![vec![10.0], vec![4.0]],
        )
        .unwrap();
        let curr = AggregateTable::from_rows(
            labels(&["Samsung", "Apple"]),
            labels(&["US"]),
            vec![vec![6.0], vec![7.0]],
        )
        .unwrap();

        let out = side_by_side(&prev, &curr, "2024", "2025", &config).unwrap();
        assert_eq!(out.row_labels(), &labels(&["US"])[..]);
        assert_eq!(out.n_cols(), 6);
        assert_eq!(out.get("US", "Apple | 2024"), Some(10.0));
        assert_eq!(out.get("US", "Apple | 2025"), Some(7.0));
        assert_eq!(out.get("US", "Apple | Diff"), Some(-3.0));
        assert_eq!(out.get("US", "Samsung | Diff"), Some(2.0));
    }

    #[test]
    fn test_side_by_side_rejects_ragged_pair() {
        let config = EngineConfig::default();
        let prev = AggregateTable::zeros(labels(&["Apple"]), labels(&["US"])).unwrap();
        let curr = AggregateTable::zeros(labels(&["Apple", "Vivo"]), labels(&["US"])).unwrap();
        assert!(side_by_side(&prev, &curr, "a", "b", &config).is_err());
    }

    #[test]
    fn test_explicit_layout() {
        let table = AggregateTable::zeros(labels(&["A", "B", "C"]), labels(&["x2", "x10", "x1"])).unwrap();
        let out = explicit_layout(&table, &labels(&["C", "Z"]), &labels(&["x10"])).unwrap();
        assert_eq!(out.row_labels(), &labels(&["C", "A", "B"])[..]);
        assert_eq!(out.col_labels(), &labels(&["x10", "x1", "x2"])[..]);
    }
}
