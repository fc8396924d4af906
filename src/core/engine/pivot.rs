//! Pivot Aggregation Engine
//!
//! Builds a 2-D `AggregateTable` from records over any number of row and
//! column fields (multi-level labels are flattened with the configured
//! separator). Absent combinations are zero for sums; a mean over a
//! combination with no records is an `EmptyGroup` error.

use crate::config::EngineConfig;
use crate::core::models::{natural_cmp, AggregateTable, Granularity, Record};
use crate::error::{IntelError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Label used for an axis with no grouping fields
pub const VALUE_LABEL: &str = "Value";

/// A record field usable as a pivot axis level
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotField {
    Entity,
    SubEntity,
    Dimension,
    Year,
    Month,
    Week,
    Quarter,

    /// Combined year/period label such as `2024 3Q`
    PeriodLabel(Granularity),

    Attribute(String),
}

impl PivotField {
    /// Label of a record on this field; `None` when the record lacks it
    pub fn value_of(&self, record: &Record) -> Option<String> {
        match self {
            PivotField::Entity => Some(record.entity.clone()),
            PivotField::SubEntity => record.sub_entity.clone(),
            PivotField::Dimension => record.dimension.clone(),
            PivotField::Year => Some(record.year.to_string()),
            PivotField::Month => record.month.map(|m| m.to_string()),
            PivotField::Week => record.week.map(|w| w.to_string()),
            PivotField::Quarter => record.quarter.map(|q| q.to_string()),
            PivotField::PeriodLabel(g) => record.period_label(*g),
            PivotField::Attribute(name) => record.attribute(name).map(|v| v.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
}

/// What to pivot and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotSpec {
    pub rows: Vec<PivotField>,
    pub columns: Vec<PivotField>,
    #[serde(default)]
    pub aggregation: Aggregation,

    /// Append a Total row and column
    #[serde(default)]
    pub totals: bool,
}

impl PivotSpec {
    pub fn new(rows: Vec<PivotField>, columns: Vec<PivotField>) -> Self {
        Self {
            rows,
            columns,
            aggregation: Aggregation::Sum,
            totals: false,
        }
    }

    /// Single-field rows by single-field columns
    pub fn by(row: PivotField, column: PivotField) -> Self {
        Self::new(vec![row], vec![column])
    }

    pub fn mean(mut self) -> Self {
        self.aggregation = Aggregation::Mean;
        self
    }

    pub fn with_totals(mut self) -> Self {
        self.totals = true;
        self
    }
}

/// Pivot aggregator
pub struct PivotAggregator<'a> {
    config: &'a EngineConfig,
}

impl<'a> PivotAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Aggregate records into a table
    ///
    /// Row and column labels are the distinct observed values in natural
    /// order; callers apply a `SortPolicy` for presentation.
    pub fn pivot(&self, records: &[Record], spec: &PivotSpec) -> Result<AggregateTable> {
        // Step 1: Label every record
        let mut skipped = 0usize;
        let mut labelled: Vec<(String, String, f64)> = Vec::with_capacity(records.len());
        for record in records {
            match (self.axis_label(record, &spec.rows), self.axis_label(record, &spec.columns)) {
                (Some(row), Some(col)) => labelled.push((row, col, record.value)),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("pivot skipped {} record(s) lacking a grouping field", skipped);
        }

        // Step 2: Distinct labels on each axis
        let row_labels = distinct_sorted(labelled.iter().map(|(r, _, _)| r.as_str()));
        let col_labels = distinct_sorted(labelled.iter().map(|(_, c, _)| c.as_str()));
        if spec.totals {
            let total = &self.config.total_label;
            if row_labels.contains(total) || col_labels.contains(total) {
                return Err(IntelError::ShapeMismatch(format!(
                    "data label '{}' collides with the synthetic total",
                    total
                )));
            }
        }

        // Step 3: Accumulate sums and counts
        let row_index: HashMap<&str, usize> = row_labels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
        let col_index: HashMap<&str, usize> = col_labels.iter().enumerate().map(|(j, l)| (l.as_str(), j)).collect();
        let mut sums = AggregateTable::zeros(row_labels.clone(), col_labels.clone())?;
        let mut counts = vec![vec![0usize; col_labels.len()]; row_labels.len()];
        for (row, col, value) in &labelled {
            let i = row_index[row.as_str()];
            let j = col_index[col.as_str()];
            sums.add_at(i, j, *value);
            counts[i][j] += 1;
        }

        // Step 4: Finish the aggregation
        let mut table = match spec.aggregation {
            Aggregation::Sum => sums,
            Aggregation::Mean => {
                let mut means = sums;
                for (i, row) in counts.iter().enumerate() {
                    for (j, count) in row.iter().enumerate() {
                        if *count == 0 {
                            return Err(IntelError::EmptyGroup {
                                row: row_labels[i].clone(),
                                column: col_labels[j].clone(),
                            });
                        }
                        let mean = means.value_at(i, j) / *count as f64;
                        means.set_at(i, j, mean);
                    }
                }
                means
            }
        };

        if spec.totals {
            table = table.with_totals(&self.config.total_label);
        }
        debug!(
            "pivot {:?} x {:?}: {} rows, {} columns",
            spec.rows,
            spec.columns,
            table.n_rows(),
            table.n_cols()
        );
        Ok(table)
    }

    fn axis_label(&self, record: &Record, fields: &[PivotField]) -> Option<String> {
        if fields.is_empty() {
            return Some(VALUE_LABEL.to_string());
        }
        let parts = fields
            .iter()
            .map(|f| f.value_of(record))
            .collect::<Option<Vec<String>>>()?;
        Some(parts.join(&self.config.label_separator))
    }
}

/// Convenience wrapper around `PivotAggregator::pivot`
pub fn pivot(records: &[Record], config: &EngineConfig, spec: &PivotSpec) -> Result<AggregateTable> {
    PivotAggregator::new(config).pivot(records, spec)
}

fn distinct_sorted<'r>(labels: impl Iterator<Item = &'r str>) -> Vec<String> {
    let mut out: Vec<String> = labels.map(|l| l.to_string()).collect();
    out.sort_by(|a, b| natural_cmp(a, b));
    out.dedup();
    out
}

/// Deterministic label ordering
///
/// Every policy except `Explicit` places the total label first when the
/// axis carries one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Digit-aware order (`W2` before `W10`)
    Natural,

    /// Plain lexicographic order
    Alphabetical,

    /// Descending by one column (default: the last non-total column), ties by label
    ByValueDesc { column: Option<String> },

    /// Listed labels first, the rest appended in natural order
    Explicit(Vec<String>),
}

impl SortPolicy {
    pub fn by_latest() -> Self {
        SortPolicy::ByValueDesc { column: None }
    }

    /// Order the row labels of `table`
    pub fn row_order(&self, table: &AggregateTable, total_label: &str) -> Vec<String> {
        let labels = table.row_labels();
        if let SortPolicy::Explicit(preferred) = self {
            return explicit_order(labels, preferred);
        }

        let mut body: Vec<String> = labels.iter().filter(|l| *l != total_label).cloned().collect();
        match self {
            SortPolicy::Natural => body.sort_by(|a, b| natural_cmp(a, b)),
            SortPolicy::Alphabetical => body.sort(),
            SortPolicy::ByValueDesc { column } => {
                let key_col = column.clone().or_else(|| {
                    table
                        .col_labels()
                        .iter()
                        .rev()
                        .find(|c| *c != total_label)
                        .cloned()
                });
                let value = |label: &str| -> f64 {
                    key_col
                        .as_deref()
                        .and_then(|c| table.get(label, c))
                        .unwrap_or(0.0)
                };
                body.sort_by(|a, b| {
                    value(b)
                        .partial_cmp(&value(a))
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| natural_cmp(a, b))
                });
            }
            SortPolicy::Explicit(_) => {}
        }

        if table.has_row(total_label) {
            body.insert(0, total_label.to_string());
        }
        body
    }
}

fn explicit_order(labels: &[String], preferred: &[String]) -> Vec<String> {
    let mut out: Vec<String> = preferred.iter().filter(|p| labels.contains(p)).cloned().collect();
    let mut rest: Vec<String> = labels.iter().filter(|l| !preferred.contains(l)).cloned().collect();
    rest.sort_by(|a, b| natural_cmp(a, b));
    out.extend(rest);
    out
}

/// Reorder the rows of a table
pub fn order_rows(table: &AggregateTable, policy: &SortPolicy, total_label: &str) -> Result<AggregateTable> {
    let order = policy.row_order(table, total_label);
    table.reindex_rows(&order)
}

/// Reorder the columns of a table
pub fn order_columns(table: &AggregateTable, policy: &SortPolicy, total_label: &str) -> Result<AggregateTable> {
    let transposed = table.transpose();
    let order = policy.row_order(&transposed, total_label);
    table.reindex_columns(&order)
}

/// Move the given labels to the front and back of a label list
///
/// Labels named in `first`/`last` but absent from `labels` are ignored.
pub fn pin(labels: &[String], first: &[&str], last: &[&str]) -> Vec<String> {
    let present = |l: &str| labels.iter().any(|x| x.as_str() == l);
    let mut out: Vec<String> = first.iter().filter(|l| present(l)).map(|l| l.to_string()).collect();
    out.extend(
        labels
            .iter()
            .filter(|l| !first.contains(&l.as_str()) && !last.contains(&l.as_str()))
            .cloned(),
    );
    out.extend(last.iter().filter(|l| present(l)).map(|l| l.to_string()));
    out
}
