//! Polars interop
//!
//! Readers hand over `DataFrame`s; the engines work on raw rows and
//! `AggregateTable`s. This module converts at that boundary in both
//! directions.

use crate::core::engine::canonicalize::coerce_number;
use crate::core::engine::row_diff::DiffReport;
use crate::core::metrics::LaunchSeries;
use crate::core::models::{AggregateTable, RawRow, RawValue};
use crate::error::Result;
use chrono::{Duration, NaiveDate};
use polars::prelude::*;

/// Convert every row of a frame into a raw row
///
/// Nulls become `RawValue::Empty`; numeric columns become numbers, date
/// columns dates and everything else text.
pub fn rows_from_frame(df: &DataFrame) -> Result<Vec<RawRow>> {
    let height = df.height();
    let mut columns: Vec<(String, Vec<RawValue>)> = Vec::with_capacity(df.width());
    for series in df.get_columns() {
        columns.push((series.name().to_string(), column_values(series)?));
    }

    let mut rows = Vec::with_capacity(height);
    for idx in 0..height {
        let row: RawRow = columns
            .iter()
            .map(|(name, values)| (name.clone(), values[idx].clone()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn column_values(series: &Series) -> Result<Vec<RawValue>> {
    let values = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.map(RawValue::text).unwrap_or(RawValue::Empty))
            .collect(),
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map(RawValue::Bool).unwrap_or(RawValue::Empty))
            .collect(),
        DataType::Date => {
            // Days since the Unix epoch
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
            let dates = series.date()?;
            (0..dates.len())
                .map(|idx| {
                    dates
                        .get(idx)
                        .and_then(|days| epoch.checked_add_signed(Duration::days(days as i64)))
                        .map(RawValue::Date)
                        .unwrap_or(RawValue::Empty)
                })
                .collect()
        }
        dtype if dtype.is_numeric() => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(RawValue::Number).unwrap_or(RawValue::Empty))
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map(RawValue::text).unwrap_or(RawValue::Empty))
            .collect(),
    };
    Ok(values)
}

/// Export a table with its row labels in a leading `index_name` column
pub fn table_to_frame(table: &AggregateTable, index_name: &str) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(table.n_cols() + 1);
    columns.push(Series::new(index_name, table.row_labels().to_vec()));
    for (j, label) in table.col_labels().iter().enumerate() {
        let values: Vec<f64> = table.values().iter().map(|row| row[j]).collect();
        columns.push(Series::new(label.as_str(), values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Export a diff report: one row per reported key with its status
pub fn diff_report_to_frame(report: &DiffReport) -> Result<DataFrame> {
    let mut status: Vec<&str> = Vec::new();
    let mut keys: Vec<Vec<String>> = vec![Vec::new(); report.key_columns.len()];
    let mut old_values: Vec<Option<f64>> = Vec::new();
    let mut new_values: Vec<Option<f64>> = Vec::new();
    let mut deltas: Vec<Option<f64>> = Vec::new();

    let value_of = |row: &RawRow| row.get(&report.value_column).map(coerce_number);
    let mut push_key = |key: &[String]| {
        for (k, part) in keys.iter_mut().zip(key.iter()) {
            k.push(part.clone());
        }
    };

    for row in &report.deleted {
        status.push("deleted");
        push_key(&row.key);
        old_values.push(value_of(&row.row));
        new_values.push(None);
        deltas.push(None);
    }
    for row in &report.changed {
        status.push("changed");
        push_key(&row.key);
        old_values.push(Some(coerce_number(&row.old_value)));
        new_values.push(Some(coerce_number(&row.new_value)));
        deltas.push(row.delta);
    }
    for row in &report.added {
        status.push("added");
        push_key(&row.key);
        old_values.push(None);
        new_values.push(value_of(&row.row));
        deltas.push(None);
    }

    let mut columns = vec![Series::new("status", status)];
    for (name, values) in report.key_columns.iter().zip(keys) {
        columns.push(Series::new(name.as_str(), values));
    }
    columns.push(Series::new("old_value", old_values));
    columns.push(Series::new("new_value", new_values));
    columns.push(Series::new("delta", deltas));
    Ok(DataFrame::new(columns)?)
}

/// Export launch-aligned series side by side over a shared `offset` column
///
/// Offsets an entity does not reach are null.
pub fn launch_to_frame(series: &[LaunchSeries]) -> Result<DataFrame> {
    let last = series
        .iter()
        .filter_map(|s| s.series.index.last().copied())
        .max()
        .unwrap_or(-1);
    let offsets: Vec<i64> = (0..=last).collect();

    let mut columns = vec![Series::new("offset", offsets.clone())];
    for s in series {
        let values: Vec<Option<f64>> = offsets.iter().map(|o| s.series.get(*o)).collect();
        columns.push(Series::new(s.entity.as_str(), values));
    }
    Ok(DataFrame::new(columns)?)
}
