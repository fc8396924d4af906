//! Snapshot Row Diff Engine
//!
//! Compares two versions of the same dataset keyed by a composite key:
//! - deleted: keys only in the old snapshot
//! - changed: keys in both whose value column differs (exact inequality)
//! - added: keys only in the new snapshot (reported only when asked for)

use crate::core::engine::canonicalize::coerce_number;
use crate::core::models::{natural_cmp, RawRow, RawValue, Record};
use crate::error::{IntelError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A plain row-oriented table handed over by a reader
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RowTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from keyed rows; the column set is the union of all row keys
    pub fn from_raw_rows(rows: &[RawRow]) -> Self {
        let columns: Vec<String> = rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .unique()
            .collect();
        let rows = rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or(RawValue::Empty))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Table view of normalized records, one column per record field
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = [
            "entity", "sub_entity", "dimension", "year", "month", "week", "quarter", "value",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        let attributes: Vec<String> = records
            .iter()
            .flat_map(|r| r.attributes.keys().cloned())
            .unique()
            .sorted()
            .collect();
        columns.extend(attributes.iter().cloned());

        let optional = |v: &Option<String>| v.clone().map(RawValue::Text).unwrap_or(RawValue::Empty);
        let period = |v: Option<u32>| v.map(|p| RawValue::Number(p as f64)).unwrap_or(RawValue::Empty);
        let rows = records
            .iter()
            .map(|r| {
                let mut row = vec![
                    RawValue::Text(r.entity.clone()),
                    optional(&r.sub_entity),
                    optional(&r.dimension),
                    RawValue::Number(r.year as f64),
                    period(r.month),
                    period(r.week),
                    period(r.quarter),
                    RawValue::Number(r.value),
                ];
                row.extend(attributes.iter().map(|a| {
                    r.attribute(a)
                        .map(|v| RawValue::text(v))
                        .unwrap_or(RawValue::Empty)
                }));
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn push(&mut self, row: Vec<RawValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(IntelError::ShapeMismatch(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A table without columns stands for an absent snapshot
    pub fn is_absent(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_map(&self, idx: usize) -> RawRow {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[idx].iter().cloned())
            .collect()
    }

    pub fn to_raw_rows(&self) -> Vec<RawRow> {
        (0..self.rows.len()).map(|i| self.row_map(i)).collect()
    }

    fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| self.column_position(c).is_none())
            .map(|c| c.to_string())
            .collect()
    }
}

/// Diff behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Surface keys present only in the new snapshot
    pub report_added: bool,
}

/// A row reported as deleted or added
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRow {
    /// Canonical key values, in key-column order
    pub key: Vec<String>,
    pub row: RawRow,
}

/// A key present on both sides with a different value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedRow {
    pub key: Vec<String>,
    pub old_value: RawValue,
    pub new_value: RawValue,

    /// new - old, when both sides are numeric
    pub delta: Option<f64>,

    pub old_row: RawRow,
    pub new_row: RawRow,
}

/// Summary of diff results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub old_rows: usize,
    pub new_rows: usize,
    pub deleted_count: usize,
    pub changed_count: usize,

    /// Keys only in the new snapshot, whether reported or not
    pub added_count: usize,

    pub unchanged_count: usize,

    /// Rows beyond the first for keys that repeat within a snapshot
    pub old_duplicate_keys: usize,
    pub new_duplicate_keys: usize,

    /// Sum of |new - old| over changed numeric rows
    pub total_value_diff: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffReport {
    pub key_columns: Vec<String>,
    pub value_column: String,
    pub deleted: Vec<DiffRow>,
    pub changed: Vec<ChangedRow>,

    /// Empty unless `DiffOptions::report_added` is set
    pub added: Vec<DiffRow>,

    pub summary: DiffSummary,
}

impl DiffReport {
    fn empty(key_columns: &[String], value_column: &str) -> Self {
        Self {
            key_columns: key_columns.to_vec(),
            value_column: value_column.to_string(),
            ..Default::default()
        }
    }

    pub fn has_differences(&self) -> bool {
        !self.deleted.is_empty() || !self.changed.is_empty() || !self.added.is_empty()
    }
}

/// Row diff engine
pub struct RowDiffEngine {
    pub options: DiffOptions,
}

impl RowDiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Diff two snapshots on `key_columns`, comparing `value_column`
    ///
    /// An absent old snapshot means a first load: nothing is reported.
    /// An absent new snapshot reports every old row as deleted.
    pub fn diff(
        &self,
        old: Option<&RowTable>,
        new: Option<&RowTable>,
        key_columns: &[String],
        value_column: &str,
    ) -> Result<DiffReport> {
        let old = match old.filter(|t| !t.is_absent()) {
            Some(t) => t,
            None => {
                debug!("no old snapshot; nothing to compare");
                return Ok(DiffReport::empty(key_columns, value_column));
            }
        };
        let absent = RowTable::default();
        let new = new.filter(|t| !t.is_absent());
        let new_present = new.is_some();
        let new = new.unwrap_or(&absent);

        // Step 1: Validate schema on both sides
        let mut required: Vec<&str> = key_columns.iter().map(|k| k.as_str()).collect();
        required.push(value_column);
        let missing = old.missing_columns(&required);
        if !missing.is_empty() {
            return Err(IntelError::schema_mismatch("old snapshot", missing));
        }
        if new_present {
            let missing = new.missing_columns(&required);
            if !missing.is_empty() {
                return Err(IntelError::schema_mismatch("new snapshot", missing));
            }
        }

        // Step 2: Group row indices by key
        let old_groups = group_by_key(old, key_columns);
        let new_groups = group_by_key(new, key_columns);

        let mut report = DiffReport::empty(key_columns, value_column);
        report.summary.old_rows = old.len();
        report.summary.new_rows = new.len();
        report.summary.old_duplicate_keys = duplicate_count(&old_groups);
        report.summary.new_duplicate_keys = duplicate_count(&new_groups);
        if report.summary.old_duplicate_keys + report.summary.new_duplicate_keys > 0 {
            warn!(
                "duplicate keys on {:?}: {} in old, {} in new; pairing in occurrence order",
                key_columns, report.summary.old_duplicate_keys, report.summary.new_duplicate_keys
            );
        }

        // Step 3: Outer join on the key, pairing repeated keys positionally
        let old_value_idx = old.column_position(value_column).unwrap_or_default();
        let new_value_idx = new.column_position(value_column).unwrap_or_default();
        let no_rows: Vec<usize> = Vec::new();

        for (key, old_rows) in &old_groups {
            let new_rows = new_groups.get(key).unwrap_or(&no_rows);
            for (pos, old_idx) in old_rows.iter().enumerate() {
                let new_idx = match new_rows.get(pos) {
                    Some(idx) => *idx,
                    None => {
                        report.deleted.push(DiffRow {
                            key: key.clone(),
                            row: old.row_map(*old_idx),
                        });
                        continue;
                    }
                };

                let old_value = &old.rows[*old_idx][old_value_idx];
                let new_value = &new.rows[new_idx][new_value_idx];
                if values_equal(old_value, new_value) {
                    report.summary.unchanged_count += 1;
                    continue;
                }
                let delta = match (numeric(old_value), numeric(new_value)) {
                    (Some(a), Some(b)) => Some(b - a),
                    _ => None,
                };
                report.changed.push(ChangedRow {
                    key: key.clone(),
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                    delta,
                    old_row: old.row_map(*old_idx),
                    new_row: new.row_map(new_idx),
                });
            }
        }

        let mut added = Vec::new();
        for (key, new_rows) in &new_groups {
            let paired = old_groups.get(key).map(|rows| rows.len()).unwrap_or(0);
            for new_idx in new_rows.iter().skip(paired) {
                added.push(DiffRow {
                    key: key.clone(),
                    row: new.row_map(*new_idx),
                });
            }
        }

        // Step 4: Deterministic ordering and summary
        report.deleted.sort_by(|a, b| compare_keys(&a.key, &b.key));
        report.changed.sort_by(|a, b| compare_keys(&a.key, &b.key));
        added.sort_by(|a, b| compare_keys(&a.key, &b.key));

        report.summary.deleted_count = report.deleted.len();
        report.summary.changed_count = report.changed.len();
        report.summary.added_count = added.len();
        report.summary.total_value_diff = report.changed.iter().filter_map(|c| c.delta).map(f64::abs).sum();
        if self.options.report_added {
            report.added = added;
        }

        debug!(
            "diff on {:?}: {} deleted, {} changed, {} added, {} unchanged",
            key_columns,
            report.summary.deleted_count,
            report.summary.changed_count,
            report.summary.added_count,
            report.summary.unchanged_count
        );
        Ok(report)
    }
}

/// Convenience wrapper around `RowDiffEngine::diff`
pub fn diff(
    old: Option<&RowTable>,
    new: Option<&RowTable>,
    key_columns: &[String],
    value_column: &str,
    options: DiffOptions,
) -> Result<DiffReport> {
    RowDiffEngine::new(options).diff(old, new, key_columns, value_column)
}

fn group_by_key(table: &RowTable, key_columns: &[String]) -> BTreeMap<Vec<String>, Vec<usize>> {
    let positions: Vec<usize> = key_columns
        .iter()
        .filter_map(|k| table.column_position(k))
        .collect();
    let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for (idx, row) in table.rows.iter().enumerate() {
        let key = positions.iter().map(|p| row[*p].key_string()).collect();
        groups.entry(key).or_default().push(idx);
    }
    groups
}

fn duplicate_count(groups: &BTreeMap<Vec<String>, Vec<usize>>) -> usize {
    groups.values().map(|rows| rows.len().saturating_sub(1)).sum()
}

fn compare_keys(a: &[String], b: &[String]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| natural_cmp(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn numeric(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) => Some(*n),
        RawValue::Text(s) if s.trim().replace(',', "").parse::<f64>().is_ok() => Some(coerce_number(value)),
        RawValue::Empty => Some(0.0),
        _ => None,
    }
}

fn values_equal(old: &RawValue, new: &RawValue) -> bool {
    match (numeric(old), numeric(new)) {
        (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => old.key_string() == new.key_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<RawValue>>) -> RowTable {
        let mut t = RowTable::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            t.push(row).unwrap();
        }
        t
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_row_diff() {
        let old = table(
            &["id", "value"],
            vec![
                vec![RawValue::Number(1.0), 100.0.into()],
                vec![RawValue::Number(2.0), 200.0.into()],
                vec![RawValue::Number(3.0), 300.0.into()],
            ],
        );
        let new = table(
            &["id", "value"],
            vec![
                vec![RawValue::Number(2.0), 200.0.into()],
                vec![RawValue::Number(3.0), 350.0.into()],
                vec![RawValue::Number(4.0), 400.0.into()],
            ],
        );

        let report = diff(Some(&old), Some(&new), &keys(&["id"]), "value", DiffOptions::default()).unwrap();
        assert_eq!(report.summary.deleted_count, 1);
        assert_eq!(report.deleted[0].key, vec!["1".to_string()]);
        assert_eq!(report.summary.changed_count, 1);
        assert_eq!(report.changed[0].delta, Some(50.0));
        assert_eq!(report.summary.unchanged_count, 1);
        assert_eq!(report.summary.added_count, 1);
        assert!(report.added.is_empty());
    }

    #[test]
    fn test_report_added_flag() {
        let old = table(&["id", "value"], vec![vec![RawValue::Number(1.0), 1.0.into()]]);
        let new = table(&["id", "value"], vec![vec![RawValue::Number(1.0), 1.0.into()], vec![RawValue::Number(2.0), 5.0.into()]]);
        let options = DiffOptions { report_added: true };
        let report = diff(Some(&old), Some(&new), &keys(&["id"]), "value", options).unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].key, vec!["2".to_string()]);
        assert!(report.deleted.is_empty() && report.changed.is_empty());
    }

    #[test]
    fn test_absent_old_is_first_load() {
        let new = table(&["id", "value"], vec![vec![RawValue::Number(1.0), 1.0.into()]]);
        let report = diff(None, Some(&new), &keys(&["id"]), "value", DiffOptions { report_added: true }).unwrap();
        assert!(!report.has_differences());

        let empty = RowTable::default();
        let report = diff(Some(&empty), Some(&new), &keys(&["id"]), "value", DiffOptions::default()).unwrap();
        assert!(!report.has_differences());
    }

    #[test]
    fn test_missing_key_column_is_schema_mismatch() {
        let old = table(&["id", "value"], vec![vec![RawValue::Number(1.0), 1.0.into()]]);
        let new = table(&["ident", "value"], vec![vec![RawValue::Number(1.0), 1.0.into()]]);
        match diff(Some(&old), Some(&new), &keys(&["id"]), "value", DiffOptions::default()) {
            Err(IntelError::SchemaMismatch { context, missing }) => {
                assert_eq!(context, "new snapshot");
                assert_eq!(missing, vec!["id".to_string()]);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_keys_match_across_types() {
        let old = table(&["Year", "Sales"], vec![vec![RawValue::Number(2024.0), 10.0.into()]]);
        let new = table(&["Year", "Sales"], vec![vec![RawValue::text("2024"), RawValue::text("10")]]);
        let report = diff(Some(&old), Some(&new), &keys(&["Year"]), "Sales", DiffOptions::default()).unwrap();
        assert!(!report.has_differences());
        assert_eq!(report.summary.unchanged_count, 1);
    }

    #[test]
    fn test_duplicate_keys_pair_in_order() {
        let old = table(
            &["id", "value"],
            vec![vec![RawValue::Number(1.0), 1.0.into()], vec![RawValue::Number(1.0), 2.0.into()], vec![RawValue::Number(1.0), 3.0.into()]],
        );
        let new = table(&["id", "value"], vec![vec![RawValue::Number(1.0), 1.0.into()], vec![RawValue::Number(1.0), 9.0.into()]]);
        let report = diff(Some(&old), Some(&new), &keys(&["id"]), "value", DiffOptions::default()).unwrap();
        assert_eq!(report.summary.old_duplicate_keys, 2);
        assert_eq!(report.summary.new_duplicate_keys, 1);
        assert_eq!(report.changed.len(), 1);
        assert_eq!(report.changed[0].new_value, RawValue::Number(9.0));
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.deleted[0].row.get("value"), Some(&RawValue::Number(3.0)));
    }

    #[test]
    fn test_from_records_columns() {
        let records = vec![Record::new("Apple", 2024, 5.0).with_month(1).with_attribute("Category", "Foldable")];
        let t = RowTable::from_records(&records);
        assert_eq!(t.columns().last().map(|c| c.as_str()), Some("Category"));
        let row = t.row_map(0);
        assert_eq!(row.get("quarter"), Some(&RawValue::Number(1.0)));
        assert_eq!(row.get("week"), Some(&RawValue::Empty));
    }
}
