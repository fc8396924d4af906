//! Dashboard Pipelines
//!
//! End-to-end compositions of the engines for each dashboard view:
//! 1. Year-over-year heatmap (YTD truncation, union reindex, Others, totals)
//! 2. Ranked single-snapshot heatmap (flagship / tracker pages)
//! 3. Fixed-layout sell-in comparison with residual Others

use crate::config::EngineConfig;
use crate::core::engine::consolidate::LongTailConsolidator;
use crate::core::engine::pivot::{order_rows, pin, PivotAggregator, PivotField, PivotSpec, SortPolicy};
use crate::core::metrics::{compare_snapshots, SnapshotComparison};
use crate::core::models::{AggregateTable, Granularity, Record, RecordFilter, SnapshotPair};
use crate::error::{IntelError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Largest period index observed in the latest year
pub fn ytd_cutoff(records: &[Record], granularity: Granularity) -> Option<u32> {
    let latest = records
        .iter()
        .filter(|r| r.period(granularity).is_some())
        .map(|r| r.year)
        .max()?;
    records
        .iter()
        .filter(|r| r.year == latest)
        .filter_map(|r| r.period(granularity))
        .max()
}

/// Keep records at or before `cutoff` in every year
///
/// Records without a period at this granularity are dropped.
pub fn truncate_to_cutoff(records: &[Record], granularity: Granularity, cutoff: u32) -> Vec<Record> {
    records
        .iter()
        .filter(|r| r.period(granularity).map_or(false, |p| p <= cutoff))
        .cloned()
        .collect()
}

/// Align both years on the same partial period
///
/// An explicit cutoff wins; otherwise the latest period observed in
/// `current_year` is used. Returns the records unchanged (and no cutoff)
/// when the current year carries no period at this granularity.
pub fn align_partial_year(
    records: Vec<Record>,
    current_year: i32,
    granularity: Granularity,
    explicit: Option<u32>,
) -> Result<(Vec<Record>, Option<u32>)> {
    let cutoff = match explicit {
        Some(c) if !granularity.is_valid(c) => {
            return Err(IntelError::Config(format!("cutoff {} is not a valid {:?} period", c, granularity)));
        }
        Some(c) => c,
        None => {
            let current: Vec<Record> = records.iter().filter(|r| r.year == current_year).cloned().collect();
            match ytd_cutoff(&current, granularity) {
                Some(c) => c,
                None => {
                    warn!("no {:?} periods in {}; YTD truncation skipped", granularity, current_year);
                    return Ok((records, None));
                }
            }
        }
    };
    Ok((truncate_to_cutoff(&records, granularity, cutoff), Some(cutoff)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapRequest {
    pub row_field: PivotField,
    pub column_field: PivotField,

    /// Defaults to the latest year in the data
    pub current_year: Option<i32>,

    /// Defaults to the year before `current_year`
    pub previous_year: Option<i32>,

    /// Truncate both years to the latest period observed in the current data
    pub ytd: Option<Granularity>,

    /// Fixed cutoff at the `ytd` granularity instead of the detected one
    pub cutoff: Option<u32>,

    /// Defaults to the configured long-tail threshold
    pub threshold: Option<f64>,

    pub filter: RecordFilter,
}

impl Default for HeatmapRequest {
    fn default() -> Self {
        Self {
            row_field: PivotField::Entity,
            column_field: PivotField::Dimension,
            current_year: None,
            previous_year: None,
            ytd: Some(Granularity::Week),
            cutoff: None,
            threshold: None,
            filter: RecordFilter::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YoyHeatmap {
    pub previous_year: i32,
    pub current_year: i32,

    /// Period cutoff applied to both years, if any
    pub cutoff: Option<u32>,

    pub pair: SnapshotPair,
    pub comparison: SnapshotComparison,
}

/// Year-over-year heatmap
///
/// Both years are pivoted, reindexed to the union of their labels, then
/// consolidated (baseline = previous year) and totalled. Rows read
/// `Total, <alphabetical>, Others`; columns `Total, <alphabetical>`.
pub fn yoy_heatmap(records: &[Record], config: &EngineConfig, request: &HeatmapRequest) -> Result<YoyHeatmap> {
    let total = config.total_label.as_str();
    let others = config.others_label.as_str();

    // Step 1: Selection and year resolution
    let selected: Vec<Record> = request
        .filter
        .apply(records, total)
        .into_iter()
        .cloned()
        .collect();
    let current_year = request
        .current_year
        .or_else(|| selected.iter().map(|r| r.year).max())
        .unwrap_or_default();
    let previous_year = request.previous_year.unwrap_or(current_year - 1);
    let in_scope: Vec<Record> = selected
        .into_iter()
        .filter(|r| r.year == current_year || r.year == previous_year)
        .collect();

    // Step 2: Partial-year alignment
    let (in_scope, cutoff) = match request.ytd {
        Some(g) => align_partial_year(in_scope, current_year, g, request.cutoff)?,
        None => {
            if request.cutoff.is_some() {
                warn!("cutoff ignored for a full-year comparison");
            }
            (in_scope, None)
        }
    };

    // Step 3: Per-year pivots on a shared coordinate system
    let spec = PivotSpec::by(request.row_field.clone(), request.column_field.clone());
    let aggregator = PivotAggregator::new(config);
    let (prev_records, curr_records): (Vec<Record>, Vec<Record>) =
        in_scope.into_iter().partition(|r| r.year == previous_year);
    let prev = aggregator.pivot(&prev_records, &spec)?;
    let curr = aggregator.pivot(&curr_records, &spec)?;
    let aligned = SnapshotPair::aligned(&prev, &curr)?;

    // Step 4: Long tail and totals
    let threshold = request.threshold.unwrap_or(config.others_threshold);
    let consolidated = LongTailConsolidator::new(config).consolidate_others(&aligned.old, &aligned.new, threshold)?;
    let old = consolidated.old.with_totals(total);
    let new = consolidated.new.with_totals(total);

    // Step 5: Layout
    let rows = pin(&SortPolicy::Alphabetical.row_order(&old, total), &[total], &[others]);
    let cols = SortPolicy::Alphabetical.row_order(&old.transpose(), total);
    let pair = SnapshotPair {
        old: old.reindex(&rows, &cols)?,
        new: new.reindex(&rows, &cols)?,
    };
    let comparison = compare_snapshots(&pair)?;

    info!(
        "YoY heatmap {} vs {}: {} rows x {} columns (cutoff {:?})",
        previous_year,
        current_year,
        pair.old.n_rows(),
        pair.old.n_cols(),
        cutoff
    );
    Ok(YoyHeatmap {
        previous_year,
        current_year,
        cutoff,
        pair,
        comparison,
    })
}

/// Column axis of a ranked heatmap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankedColumns {
    Year,
    Period(Granularity),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankedRequest {
    pub columns: RankedColumns,

    /// Years kept; empty keeps all
    pub years: Vec<i32>,

    /// Truncate every year to the latest month observed (flagship view)
    pub latest_month_only: bool,

    pub filter: RecordFilter,
}

impl Default for RankedRequest {
    fn default() -> Self {
        Self {
            columns: RankedColumns::Year,
            years: Vec::new(),
            latest_month_only: false,
            filter: RecordFilter::default(),
        }
    }
}

/// Single-snapshot heatmap: entity x year (or period label), with a Total
/// row, ranked by the last column descending and Total first
pub fn ranked_heatmap(records: &[Record], config: &EngineConfig, request: &RankedRequest) -> Result<AggregateTable> {
    let total = config.total_label.as_str();

    let mut selected: Vec<Record> = request
        .filter
        .apply(records, total)
        .into_iter()
        .cloned()
        .collect();
    if request.latest_month_only {
        if let Some(cutoff) = ytd_cutoff(&selected, Granularity::Month) {
            selected = truncate_to_cutoff(&selected, Granularity::Month, cutoff);
        }
    }
    if !request.years.is_empty() {
        selected.retain(|r| request.years.contains(&r.year));
    }

    let column = match request.columns {
        RankedColumns::Year => PivotField::Year,
        RankedColumns::Period(g) => PivotField::PeriodLabel(g),
    };
    let table = PivotAggregator::new(config).pivot(&selected, &PivotSpec::by(PivotField::Entity, column))?;
    let with_total_row = drop_total_column(&table.with_totals(total), total)?;
    order_rows(&with_total_row, &SortPolicy::by_latest(), total)
}

fn drop_total_column(table: &AggregateTable, total: &str) -> Result<AggregateTable> {
    let cols: Vec<String> = table.col_labels().iter().filter(|c| *c != total).cloned().collect();
    table.reindex_columns(&cols)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellInRequest {
    /// Defaults to the latest year in the data
    pub current_year: Option<i32>,

    /// Truncate both years to the latest period of the current year;
    /// `None` compares full years
    pub ytd: Option<Granularity>,

    /// Fixed cutoff at the `ytd` granularity instead of the detected one
    pub cutoff: Option<u32>,

    pub tracked_regions: Vec<String>,
    pub tracked_brands: Vec<String>,
}

impl Default for SellInRequest {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            current_year: None,
            ytd: Some(Granularity::Month),
            cutoff: None,
            tracked_regions: owned(&["China", "India", "US", "W.Europe"]),
            tracked_brands: owned(&["Apple", "MX", "Xiaomi", "Oppo", "Vivo", "Transsion", "Honor", "Huawei"]),
        }
    }
}

/// Sell-in region x brand layout for the previous and current year
///
/// Both years are cut at the same month, and both tables share the fixed
/// `[Total, tracked..., Others]` layout, so the pair compares directly.
pub fn sell_in_layout(records: &[Record], config: &EngineConfig, request: &SellInRequest) -> Result<SnapshotPair> {
    let current_year = request
        .current_year
        .or_else(|| records.iter().map(|r| r.year).max())
        .unwrap_or_default();
    let previous_year = current_year - 1;

    // Step 1: Partial-year alignment
    let in_scope: Vec<Record> = records
        .iter()
        .filter(|r| r.year == current_year || r.year == previous_year)
        .cloned()
        .collect();
    let (records, cutoff) = match request.ytd {
        Some(g) => align_partial_year(in_scope, current_year, g, request.cutoff)?,
        None => (in_scope, None),
    };

    // Step 2: Fixed layout per year
    let spec = PivotSpec::by(PivotField::Dimension, PivotField::Entity);
    let aggregator = PivotAggregator::new(config);
    let consolidator = LongTailConsolidator::new(config);
    let layout = |year: i32| -> Result<AggregateTable> {
        let year_records: Vec<Record> = records.iter().filter(|r| r.year == year).cloned().collect();
        let table = aggregator.pivot(&year_records, &spec)?;
        consolidator.residual_others(&table, &request.tracked_regions, &request.tracked_brands)
    };

    let pair = SnapshotPair {
        old: layout(previous_year)?,
        new: layout(current_year)?,
    };
    info!("sell-in layout {} vs {} (cutoff {:?})", previous_year, current_year, cutoff);
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ytd_cutoff_and_truncation() {
        let records = vec![
            Record::new("A", 2024, 1.0).with_week(30),
            Record::new("A", 2025, 1.0).with_week(12),
            Record::new("A", 2025, 1.0).with_week(10),
            Record::new("A", 2025, 1.0),
        ];
        assert_eq!(ytd_cutoff(&records, Granularity::Week), Some(12));
        let kept = truncate_to_cutoff(&records, Granularity::Week, 12);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.year == 2025));
    }

    fn monthly(entity: &str, year: i32, months: std::ops::RangeInclusive<u32>) -> Vec<Record> {
        months
            .map(|m| Record::new(entity, year, 10.0).with_dimension("China").with_month(m))
            .collect()
    }

    #[test]
    fn test_sell_in_cuts_both_years_at_latest_month() {
        let config = EngineConfig::default();
        let mut records = monthly("Apple", 2024, 1..=12);
        records.extend(monthly("Apple", 2025, 1..=3));

        let pair = sell_in_layout(&records, &config, &SellInRequest::default()).unwrap();
        assert_eq!(pair.old.get("China", "Apple"), Some(30.0));
        assert_eq!(pair.new.get("China", "Apple"), Some(30.0));

        let fixed = SellInRequest {
            cutoff: Some(2),
            ..Default::default()
        };
        let pair = sell_in_layout(&records, &config, &fixed).unwrap();
        assert_eq!(pair.old.get("China", "Apple"), Some(20.0));
        assert_eq!(pair.new.get("China", "Apple"), Some(20.0));

        let full = SellInRequest {
            ytd: None,
            ..Default::default()
        };
        let pair = sell_in_layout(&records, &config, &full).unwrap();
        assert_eq!(pair.old.get("China", "Apple"), Some(120.0));
    }

    #[test]
    fn test_heatmap_explicit_cutoff() {
        let config = EngineConfig::default();
        let mut records = monthly("Apple", 2024, 1..=12);
        records.extend(monthly("Apple", 2025, 1..=3));
        let request = HeatmapRequest {
            ytd: Some(Granularity::Month),
            cutoff: Some(1),
            threshold: Some(0.0),
            ..Default::default()
        };

        let heatmap = yoy_heatmap(&records, &config, &request).unwrap();
        assert_eq!(heatmap.cutoff, Some(1));
        assert_eq!(heatmap.pair.old.get("Apple", "China"), Some(10.0));
        assert_eq!(heatmap.pair.new.get("Apple", "China"), Some(10.0));

        let invalid = HeatmapRequest {
            cutoff: Some(13),
            ..request
        };
        assert!(matches!(
            yoy_heatmap(&records, &config, &invalid),
            Err(IntelError::Config(_))
        ));
    }

    #[test]
    fn test_ranked_heatmap_quarter_labels() {
        let config = EngineConfig::default();
        let records = vec![
            Record::new("Apple", 2024, 5.0).with_quarter(4),
            Record::new("Apple", 2025, 1.0).with_quarter(1),
            Record::new("Samsung", 2025, 3.0).with_quarter(1),
        ];
        let request = RankedRequest {
            columns: RankedColumns::Period(Granularity::Quarter),
            ..Default::default()
        };
        let table = ranked_heatmap(&records, &config, &request).unwrap();
        assert_eq!(table.col_labels(), &["2024 4Q".to_string(), "2025 1Q".to_string()][..]);
        assert_eq!(
            table.row_labels(),
            &["Total".to_string(), "Samsung".to_string(), "Apple".to_string()][..]
        );
        assert_eq!(table.get("Total", "2025 1Q"), Some(4.0));
    }

    #[test]
    fn test_flagship_truncates_to_latest_month() {
        let config = EngineConfig::default();
        let records = vec![
            Record::new("Apple", 2024, 5.0).with_month(2),
            Record::new("Apple", 2024, 7.0).with_month(9),
            Record::new("Apple", 2025, 2.0).with_month(3),
        ];
        let request = RankedRequest {
            latest_month_only: true,
            ..Default::default()
        };
        let table = ranked_heatmap(&records, &config, &request).unwrap();
        assert_eq!(table.get("Apple", "2024"), Some(5.0));
        assert_eq!(table.get("Apple", "2025"), Some(2.0));
    }
}
