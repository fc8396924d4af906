//! Trend views: period-by-year series and share-of-total mixes

use crate::config::EngineConfig;
use crate::core::engine::pivot::{PivotAggregator, PivotField, PivotSpec};
use crate::core::models::{AggregateTable, Granularity, IndexedSeries, Record, RecordFilter};
use crate::error::Result;
use std::collections::BTreeMap;

/// One series per requested year, indexed by period number
///
/// The index runs from 1 to the largest period observed in any of the
/// years. Periods with no records are missing, not zero; in cumulative
/// mode they contribute zero to the running sum. Years without any
/// matching record are omitted.
pub fn period_trend(
    records: &[Record],
    config: &EngineConfig,
    granularity: Granularity,
    years: &[i32],
    filter: &RecordFilter,
    cumulative: bool,
) -> Vec<IndexedSeries> {
    let mut per_year: BTreeMap<i32, BTreeMap<i64, f64>> = BTreeMap::new();
    for record in filter.apply(records, &config.total_label) {
        if !years.is_empty() && !years.contains(&record.year) {
            continue;
        }
        let period = match record.period(granularity) {
            Some(p) if granularity.is_valid(p) => p,
            _ => continue,
        };
        *per_year
            .entry(record.year)
            .or_default()
            .entry(period as i64)
            .or_insert(0.0) += record.value;
    }

    let last = per_year
        .values()
        .filter_map(|points| points.keys().next_back().copied())
        .max()
        .unwrap_or(0);

    per_year
        .into_iter()
        .map(|(year, points)| {
            let series = IndexedSeries::contiguous(year.to_string(), &points, 1, last);
            if cumulative {
                series.cumulative()
            } else {
                series
            }
        })
        .collect()
}

/// Rescale each row to percent of its row sum
///
/// A row summing to zero stays all zeros. Any Total column is excluded
/// from the sum and dropped from the result.
pub fn share_of_total(table: &AggregateTable, total_label: &str) -> Result<AggregateTable> {
    let cols: Vec<String> = table
        .col_labels()
        .iter()
        .filter(|c| *c != total_label)
        .cloned()
        .collect();
    let body = table.reindex_columns(&cols)?;
    let values = body
        .values()
        .iter()
        .map(|row| {
            let sum: f64 = row.iter().sum();
            row.iter()
                .map(|v| if sum == 0.0 { 0.0 } else { v / sum * 100.0 })
                .collect()
        })
        .collect();
    AggregateTable::from_rows(body.row_labels().to_vec(), cols, values)
}

/// Year by `column` volume table, optionally as a share of each year
pub fn year_mix(
    records: &[Record],
    config: &EngineConfig,
    years: &[i32],
    column: PivotField,
    as_share: bool,
) -> Result<AggregateTable> {
    let selected: Vec<Record> = records
        .iter()
        .filter(|r| years.is_empty() || years.contains(&r.year))
        .cloned()
        .collect();
    let table = PivotAggregator::new(config).pivot(&selected, &PivotSpec::by(PivotField::Year, column))?;
    if as_share {
        share_of_total(&table, &config.total_label)
    } else {
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly() -> Vec<Record> {
        vec![
            Record::new("Apple", 2024, 5.0).with_week(1).with_dimension("US"),
            Record::new("Apple", 2024, 3.0).with_week(3).with_dimension("US"),
            Record::new("Samsung", 2024, 2.0).with_week(3).with_dimension("US"),
            Record::new("Apple", 2025, 4.0).with_week(2).with_dimension("China"),
            Record::new("Apple", 2023, 9.0).with_week(1).with_dimension("US"),
        ]
    }

    #[test]
    fn test_period_trend_keeps_gaps() {
        let config = EngineConfig::default();
        let out = period_trend(&weekly(), &config, Granularity::Week, &[2024, 2025], &RecordFilter::new(), false);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "2024");
        assert_eq!(out[0].values, vec![Some(5.0), None, Some(5.0)]);
        assert_eq!(out[1].values, vec![None, Some(4.0), None]);
    }

    #[test]
    fn test_period_trend_cumulative_with_filter() {
        let config = EngineConfig::default();
        let filter = RecordFilter::new().entity("Apple").dimension("US");
        let out = period_trend(&weekly(), &config, Granularity::Week, &[2024], &filter, true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].values, vec![Some(5.0), Some(5.0), Some(8.0)]);
    }

    #[test]
    fn test_share_of_total() {
        let table = AggregateTable::from_rows(
            vec!["2024".to_string(), "2025".to_string()],
            vec!["A".to_string(), "B".to_string()],
            vec![vec![1.0, 3.0], vec![0.0, 0.0]],
        )
        .unwrap();
        let share = share_of_total(&table, "Total").unwrap();
        assert_eq!(share.get("2024", "A"), Some(25.0));
        assert_eq!(share.get("2025", "B"), Some(0.0));
    }

    #[test]
    fn test_year_mix_by_region() {
        let config = EngineConfig::default();
        let mix = year_mix(&weekly(), &config, &[2024, 2025], PivotField::Dimension, true).unwrap();
        assert_eq!(mix.get("2024", "US"), Some(100.0));
        assert_eq!(mix.get("2025", "China"), Some(100.0));
        assert!(!mix.has_row("2023"));
    }
}
