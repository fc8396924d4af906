//! Aggregate Table
//!
//! A dense 2-D table keyed by (row label, column label). Labels are
//! distinct on each axis. Every transformation returns a new table.

use crate::error::{IntelError, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    row_labels: Vec<String>,
    col_labels: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl Default for AggregateTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl AggregateTable {
    pub fn empty() -> Self {
        Self {
            row_labels: Vec::new(),
            col_labels: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Zero-filled table over the given labels
    pub fn zeros(rows: Vec<String>, cols: Vec<String>) -> Result<Self> {
        check_distinct(&rows, "row")?;
        check_distinct(&cols, "column")?;
        let values = vec![vec![0.0; cols.len()]; rows.len()];
        Ok(Self {
            row_labels: rows,
            col_labels: cols,
            values,
        })
    }

    /// Table from row-major values
    pub fn from_rows(rows: Vec<String>, cols: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self> {
        check_distinct(&rows, "row")?;
        check_distinct(&cols, "column")?;
        if values.len() != rows.len() {
            return Err(IntelError::ShapeMismatch(format!(
                "{} row labels but {} value rows",
                rows.len(),
                values.len()
            )));
        }
        if let Some((idx, row)) = values.iter().enumerate().find(|(_, r)| r.len() != cols.len()) {
            return Err(IntelError::ShapeMismatch(format!(
                "row '{}' has {} values, expected {}",
                rows[idx],
                row.len(),
                cols.len()
            )));
        }
        Ok(Self {
            row_labels: rows,
            col_labels: cols,
            values,
        })
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[String] {
        &self.col_labels
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.row_labels.len()
    }

    pub fn n_cols(&self) -> usize {
        self.col_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_labels.is_empty() || self.col_labels.is_empty()
    }

    pub fn row_position(&self, label: &str) -> Option<usize> {
        self.row_labels.iter().position(|l| l == label)
    }

    pub fn col_position(&self, label: &str) -> Option<usize> {
        self.col_labels.iter().position(|l| l == label)
    }

    pub fn has_row(&self, label: &str) -> bool {
        self.row_position(label).is_some()
    }

    pub fn has_col(&self, label: &str) -> bool {
        self.col_position(label).is_some()
    }

    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let i = self.row_position(row)?;
        let j = self.col_position(col)?;
        Some(self.values[i][j])
    }

    pub fn row_values(&self, label: &str) -> Option<&[f64]> {
        self.row_position(label).map(|i| self.values[i].as_slice())
    }

    pub fn column_values(&self, label: &str) -> Option<Vec<f64>> {
        let j = self.col_position(label)?;
        Some(self.values.iter().map(|row| row[j]).collect())
    }

    pub(crate) fn value_at(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub(crate) fn set_at(&mut self, i: usize, j: usize, value: f64) {
        self.values[i][j] = value;
    }

    pub(crate) fn add_at(&mut self, i: usize, j: usize, value: f64) {
        self.values[i][j] += value;
    }

    /// Copy of the table with one cell replaced
    pub fn with_value(&self, row: &str, col: &str, value: f64) -> Result<Self> {
        let (i, j) = match (self.row_position(row), self.col_position(col)) {
            (Some(i), Some(j)) => (i, j),
            _ => {
                return Err(IntelError::ShapeMismatch(format!(
                    "cell ({}, {}) is not part of the table",
                    row, col
                )))
            }
        };
        let mut out = self.clone();
        out.set_at(i, j, value);
        Ok(out)
    }

    /// Sum of every cell whose row and column are not `excluded`
    pub fn sum_excluding(&self, excluded: &str) -> f64 {
        let mut total = 0.0;
        for (i, row) in self.row_labels.iter().enumerate() {
            if row == excluded {
                continue;
            }
            for (j, col) in self.col_labels.iter().enumerate() {
                if col != excluded {
                    total += self.values[i][j];
                }
            }
        }
        total
    }

    /// Reindex to exactly the given labels
    ///
    /// Labels absent from this table become zero-filled rows/columns;
    /// labels not listed are dropped.
    pub fn reindex(&self, rows: &[String], cols: &[String]) -> Result<Self> {
        let mut out = Self::zeros(rows.to_vec(), cols.to_vec())?;
        let col_map: Vec<Option<usize>> = cols.iter().map(|c| self.col_position(c)).collect();
        for (i, row) in rows.iter().enumerate() {
            if let Some(src_i) = self.row_position(row) {
                for (j, src_j) in col_map.iter().enumerate() {
                    if let Some(src_j) = src_j {
                        out.values[i][j] = self.values[src_i][*src_j];
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn reindex_rows(&self, rows: &[String]) -> Result<Self> {
        self.reindex(rows, &self.col_labels)
    }

    pub fn reindex_columns(&self, cols: &[String]) -> Result<Self> {
        self.reindex(&self.row_labels, cols)
    }

    pub fn has_totals(&self, total_label: &str) -> bool {
        self.has_row(total_label) || self.has_col(total_label)
    }

    /// Drop the total row and column, if present
    pub fn without_totals(&self, total_label: &str) -> Self {
        let keep_rows: Vec<usize> = (0..self.n_rows())
            .filter(|i| self.row_labels[*i] != total_label)
            .collect();
        let keep_cols: Vec<usize> = (0..self.n_cols())
            .filter(|j| self.col_labels[*j] != total_label)
            .collect();
        Self {
            row_labels: keep_rows.iter().map(|i| self.row_labels[*i].clone()).collect(),
            col_labels: keep_cols.iter().map(|j| self.col_labels[*j].clone()).collect(),
            values: keep_rows
                .iter()
                .map(|i| keep_cols.iter().map(|j| self.values[*i][*j]).collect())
                .collect(),
        }
    }

    /// Recompute the total row and column from the data cells
    ///
    /// Any existing totals are discarded first. The total column is appended
    /// after the data columns and the total row after the data rows; the
    /// corner cell is the grand total.
    pub fn with_totals(&self, total_label: &str) -> Self {
        let mut out = self.without_totals(total_label);
        for row in out.values.iter_mut() {
            let sum: f64 = row.iter().sum();
            row.push(sum);
        }
        out.col_labels.push(total_label.to_string());

        let width = out.col_labels.len();
        let mut total_row = vec![0.0; width];
        for row in &out.values {
            for (j, v) in row.iter().enumerate() {
                total_row[j] += v;
            }
        }
        out.values.push(total_row);
        out.row_labels.push(total_label.to_string());
        out
    }

    /// Copy with a zero row added when `label` is absent
    pub fn with_row(&self, label: &str) -> Self {
        if self.has_row(label) {
            return self.clone();
        }
        let mut out = self.clone();
        out.row_labels.push(label.to_string());
        out.values.push(vec![0.0; out.col_labels.len()]);
        out
    }

    pub fn transpose(&self) -> Self {
        let values = (0..self.n_cols())
            .map(|j| self.values.iter().map(|row| row[j]).collect())
            .collect();
        Self {
            row_labels: self.col_labels.clone(),
            col_labels: self.row_labels.clone(),
            values,
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            row_labels: self.row_labels.clone(),
            col_labels: self.col_labels.clone(),
            values: self
                .values
                .iter()
                .map(|row| row.iter().map(|v| f(*v)).collect())
                .collect(),
        }
    }

    /// Whether both tables carry the same label sets (order ignored)
    pub fn same_labels(&self, other: &AggregateTable) -> bool {
        same_set(&self.row_labels, &other.row_labels) && same_set(&self.col_labels, &other.col_labels)
    }

    /// Reorder this table into `other`'s label order
    ///
    /// Fails when the label sets differ: element-wise work is never done on
    /// the intersection of two ragged tables.
    pub fn align_to(&self, other: &AggregateTable) -> Result<Self> {
        if !self.same_labels(other) {
            return Err(IntelError::ShapeMismatch(format!(
                "label sets differ: rows {:?} vs {:?}, columns {:?} vs {:?}",
                self.row_labels, other.row_labels, self.col_labels, other.col_labels
            )));
        }
        self.reindex(&other.row_labels, &other.col_labels)
    }

    /// Element-wise combination; `other` is aligned to this table's order
    pub fn zip_with(&self, other: &AggregateTable, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        let other = other.align_to(self)?;
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a.iter().zip(b.iter()).map(|(x, y)| f(*x, *y)).collect())
            .collect();
        Ok(Self {
            row_labels: self.row_labels.clone(),
            col_labels: self.col_labels.clone(),
            values,
        })
    }
}

/// Two tables over one coordinate system (old/new file, or year N-1/N)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotPair {
    pub old: AggregateTable,
    pub new: AggregateTable,
}

impl SnapshotPair {
    /// Pair two tables that already share label sets
    pub fn new(old: AggregateTable, new: AggregateTable) -> Result<Self> {
        let new = new.align_to(&old)?;
        Ok(Self { old, new })
    }

    /// Reindex both tables to the union of their labels, then pair them
    pub fn aligned(old: &AggregateTable, new: &AggregateTable) -> Result<Self> {
        let rows = union_labels(old.row_labels(), new.row_labels());
        let cols = union_labels(old.col_labels(), new.col_labels());
        Ok(Self {
            old: old.reindex(&rows, &cols)?,
            new: new.reindex(&rows, &cols)?,
        })
    }

    pub fn row_labels(&self) -> &[String] {
        self.old.row_labels()
    }

    pub fn col_labels(&self) -> &[String] {
        self.old.col_labels()
    }
}

/// Union of two label lists in natural order
pub fn union_labels(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out: Vec<String> = a
        .iter()
        .chain(b.iter())
        .filter(|l| seen.insert(l.as_str()))
        .cloned()
        .collect();
    out.sort_by(|x, y| natural_cmp(x, y));
    out
}

/// Digit-aware ordering: `W2` < `W10`, `2024 3Q` < `2025 1Q`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = split_runs(a);
    let right = split_runs(b);
    for (x, y) in left.iter().zip(right.iter()) {
        let ord = match (x, y) {
            (Run::Digits(dx), Run::Digits(dy)) => {
                let tx = dx.trim_start_matches('0');
                let ty = dy.trim_start_matches('0');
                tx.len().cmp(&ty.len()).then_with(|| tx.cmp(ty))
            }
            (Run::Digits(_), Run::Text(_)) => Ordering::Less,
            (Run::Text(_), Run::Digits(_)) => Ordering::Greater,
            (Run::Text(tx), Run::Text(ty)) => tx.cmp(ty),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn split_runs(s: &str) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;
    for (idx, ch) in s.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match in_digits {
            Some(current) if current != is_digit => {
                runs.push(make_run(&s[start..idx], current));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(current) = in_digits {
        runs.push(make_run(&s[start..], current));
    }
    runs
}

fn make_run(s: &str, digits: bool) -> Run<'_> {
    if digits {
        Run::Digits(s)
    } else {
        Run::Text(s)
    }
}

fn same_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let set: HashSet<&String> = a.iter().collect();
    b.iter().all(|l| set.contains(l))
}

fn check_distinct(labels: &[String], axis: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(IntelError::ShapeMismatch(format!(
                "duplicate {} label '{}'",
                axis, label
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> AggregateTable {
        AggregateTable::from_rows(
            labels(&["Apple", "Samsung"]),
            labels(&["China", "US"]),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let err = AggregateTable::zeros(labels(&["A", "A"]), labels(&["x"]));
        assert!(matches!(err, Err(IntelError::ShapeMismatch(_))));
    }

    #[test]
    fn test_with_totals_conserves() {
        let t = sample().with_totals("Total");
        assert_eq!(t.get("Total", "Total"), Some(10.0));
        assert_eq!(t.get("Apple", "Total"), Some(3.0));
        assert_eq!(t.get("Total", "US"), Some(6.0));
        assert_eq!(t.sum_excluding("Total"), 10.0);
    }

    #[test]
    fn test_with_totals_discards_stale_totals() {
        let stale = sample()
            .with_totals("Total")
            .with_value("Total", "Total", 999.0)
            .unwrap();
        let fresh = stale.with_totals("Total");
        assert_eq!(fresh.get("Total", "Total"), Some(10.0));
        assert_eq!(fresh.n_rows(), 3);
        assert_eq!(fresh.n_cols(), 3);
    }

    #[test]
    fn test_reindex_fills_and_drops() {
        let t = sample().reindex(&labels(&["Samsung", "Xiaomi"]), &labels(&["US", "India"])).unwrap();
        assert_eq!(t.row_labels(), &labels(&["Samsung", "Xiaomi"])[..]);
        assert_eq!(t.get("Samsung", "US"), Some(4.0));
        assert_eq!(t.get("Xiaomi", "US"), Some(0.0));
        assert_eq!(t.get("Samsung", "India"), Some(0.0));
        assert!(!t.has_row("Apple"));
    }

    #[test]
    fn test_reindex_to_own_labels_is_identity() {
        let t = sample();
        let same = t.reindex(t.row_labels(), t.col_labels()).unwrap();
        assert_eq!(same, t);
    }

    #[test]
    fn test_zip_with_refuses_ragged_tables() {
        let a = sample();
        let b = sample().with_row("Xiaomi");
        assert!(matches!(a.zip_with(&b, |x, y| x - y), Err(IntelError::ShapeMismatch(_))));
    }

    #[test]
    fn test_zip_with_aligns_permuted_labels() {
        let a = sample();
        let b = a.reindex(&labels(&["Samsung", "Apple"]), &labels(&["US", "China"])).unwrap();
        let diff = a.zip_with(&b, |x, y| x - y).unwrap();
        assert!(diff.values().iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn test_snapshot_pair_union() {
        let old = sample();
        let new = AggregateTable::from_rows(labels(&["Xiaomi"]), labels(&["India"]), vec![vec![5.0]]).unwrap();
        let pair = SnapshotPair::aligned(&old, &new).unwrap();
        assert_eq!(pair.row_labels(), &labels(&["Apple", "Samsung", "Xiaomi"])[..]);
        assert_eq!(pair.col_labels(), &labels(&["China", "India", "US"])[..]);
        assert_eq!(pair.old.get("Xiaomi", "India"), Some(0.0));
        assert_eq!(pair.new.get("Xiaomi", "India"), Some(5.0));
    }

    #[test]
    fn test_natural_cmp() {
        let mut items = labels(&["W10", "W2", "2025 1Q", "2024 3Q", "Apple"]);
        items.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(items, labels(&["2024 3Q", "2025 1Q", "Apple", "W2", "W10"]));
    }

    #[test]
    fn test_transpose() {
        let t = sample().transpose();
        assert_eq!(t.get("US", "Apple"), Some(2.0));
        assert_eq!(t.row_labels(), &labels(&["China", "US"])[..]);
    }
}
