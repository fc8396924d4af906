use market_intel::config::EngineConfig;
use market_intel::core::engine::{pivot, ColumnMapping, PivotField, PivotSpec, RecordCanonicalizer};
use market_intel::core::metrics::{align_to_launch, LaunchRequest};
use market_intel::core::models::Granularity;
use market_intel::frame::{launch_to_frame, rows_from_frame, table_to_frame};
use polars::prelude::*;
use pretty_assertions::assert_eq;

fn sellout_frame() -> DataFrame {
    df!(
        "Brand" => &["APPLE ", "realme", "Nokia", "Samsung", "Apple"],
        "Model" => &["iPhone 15", "C55", "G42", "S24", "iPhone 15"],
        "Region" => &["US", "US", "China", "East Europe", "US"],
        "Year" => &[2024i64, 2024, 2024, 2024, 2024],
        "Month" => &[1i64, 2, 2, 2, 3],
        "Sales" => &[10.0, 5.0, 2.0, 99.0, 4.0]
    )
    .unwrap()
}

#[test]
fn test_frame_to_pivot() {
    let config = EngineConfig::default();
    let rows = rows_from_frame(&sellout_frame()).unwrap();
    let normalized = RecordCanonicalizer::new(&config, ColumnMapping::default())
        .normalize(&rows)
        .unwrap();

    assert_eq!(normalized.report.rows_in, 5);
    assert_eq!(normalized.report.excluded, 1);
    assert_eq!(normalized.report.records_out, 4);

    let spec = PivotSpec::by(PivotField::Entity, PivotField::Dimension).with_totals();
    let table = pivot(&normalized.records, &config, &spec).unwrap();
    assert_eq!(table.get("Apple", "US"), Some(14.0));
    assert_eq!(table.get("Oppo", "US"), Some(5.0));
    assert_eq!(table.get("Others", "China"), Some(2.0));
    assert_eq!(table.get("Total", "Total"), Some(21.0));

    let out = table_to_frame(&table, "Brand").unwrap();
    assert_eq!(out.height(), table.n_rows());
    assert_eq!(out.width(), table.n_cols() + 1);
}

#[test]
fn test_launch_frame_pads_short_series() {
    let config = EngineConfig::default();
    let rows = rows_from_frame(&sellout_frame()).unwrap();
    let records = RecordCanonicalizer::new(&config, ColumnMapping::default())
        .normalize(&rows)
        .unwrap()
        .records;

    let request = LaunchRequest::new(PivotField::SubEntity, Granularity::Month);
    let aligned = align_to_launch(&records, &request).unwrap();
    let out = launch_to_frame(&aligned).unwrap();

    // iPhone 15 spans Jan..Mar; the single-month models stop at offset 0
    assert_eq!(out.height(), 3);
    let iphone = out.column("iPhone 15").unwrap().f64().unwrap();
    assert_eq!(iphone.get(0), Some(10.0));
    assert_eq!(iphone.get(1), None);
    assert_eq!(iphone.get(2), Some(4.0));
    let c55 = out.column("C55").unwrap().f64().unwrap();
    assert_eq!(c55.get(1), None);
}
