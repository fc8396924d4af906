use market_intel::config::{BrandAliases, EngineConfig};
use market_intel::core::engine::{check_conservation, check_total_diff, diff, DiffOptions, PivotField, RowTable};
use market_intel::core::metrics::{align_to_launch, compare_tables, Growth, LaunchRequest};
use market_intel::core::models::{AggregateTable, Granularity, Record};
use market_intel::export::side_by_side;
use market_intel::ingestion::read_csv_rows;
use market_intel::pipeline::{sell_in_layout, yoy_heatmap, HeatmapRequest, SellInRequest};
use pretty_assertions::assert_eq;

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn full_year(threshold: f64) -> HeatmapRequest {
    HeatmapRequest {
        ytd: None,
        threshold: Some(threshold),
        ..Default::default()
    }
}

#[test]
fn test_yoy_heatmap_diff_and_growth() {
    let config = EngineConfig::default();
    let records = vec![
        Record::new("Apple", 2024, 1_000_000.0).with_dimension("US"),
        Record::new("Apple", 2025, 1_500_000.0).with_dimension("US"),
    ];

    let heatmap = yoy_heatmap(&records, &config, &full_year(0.0)).unwrap();
    assert_eq!(heatmap.previous_year, 2024);
    assert_eq!(heatmap.current_year, 2025);
    assert_eq!(heatmap.pair.row_labels(), &labels(&["Total", "Apple", "Others"])[..]);
    assert_eq!(heatmap.pair.col_labels(), &labels(&["Total", "US"])[..]);

    let comparison = &heatmap.comparison;
    assert_eq!(comparison.diff.get("Apple", "US"), Some(500_000.0));
    assert_eq!(comparison.diff.get("Total", "Total"), Some(500_000.0));
    assert_eq!(comparison.growth.get("Apple", "US"), Some(Growth::Pct(50.0)));
    assert_eq!(comparison.growth.get("Others", "US"), Some(Growth::Pct(0.0)));
}

#[test]
fn test_yoy_heatmap_folds_long_tail_by_baseline() {
    let config = EngineConfig::default();
    let records = vec![
        Record::new("Apple", 2024, 5_000_000.0).with_dimension("US"),
        Record::new("Vivo", 2024, 900_000.0).with_dimension("US"),
        Record::new("Apple", 2025, 6_000_000.0).with_dimension("US"),
        Record::new("Vivo", 2025, 1_200_000.0).with_dimension("US"),
        Record::new("Honor", 2025, 300_000.0).with_dimension("US"),
    ];

    let heatmap = yoy_heatmap(&records, &config, &full_year(config.others_threshold)).unwrap();
    let pair = &heatmap.pair;
    assert_eq!(
        pair.row_labels(),
        &labels(&["Total", "Apple", "Honor", "Vivo", "Others"])[..]
    );

    // Vivo stays in Others for both years even though it crossed the threshold
    assert_eq!(pair.old.get("Others", "US"), Some(900_000.0));
    assert_eq!(pair.new.get("Others", "US"), Some(1_500_000.0));
    assert_eq!(pair.new.get("Vivo", "US"), Some(0.0));
    assert_eq!(pair.new.get("Honor", "US"), Some(0.0));
    assert_eq!(pair.old.get("Total", "Total"), Some(5_900_000.0));
    assert_eq!(pair.new.get("Total", "Total"), Some(7_500_000.0));

    assert!(check_conservation(&pair.old, 6).unwrap().passes);
    assert!(check_conservation(&pair.new, 6).unwrap().passes);
    assert!(check_total_diff(&heatmap.comparison, 6).unwrap().passes);
}

#[test]
fn test_yoy_heatmap_ytd_truncation() {
    let config = EngineConfig::default();
    let records = vec![
        Record::new("Apple", 2024, 2_000_000.0).with_dimension("US").with_week(2),
        Record::new("Apple", 2024, 9_000_000.0).with_dimension("US").with_week(40),
        Record::new("Apple", 2025, 3_000_000.0).with_dimension("US").with_week(3),
    ];
    let request = HeatmapRequest {
        threshold: Some(0.0),
        ..Default::default()
    };

    let heatmap = yoy_heatmap(&records, &config, &request).unwrap();
    assert_eq!(heatmap.cutoff, Some(3));
    assert_eq!(heatmap.pair.old.get("Apple", "US"), Some(2_000_000.0));
    assert_eq!(heatmap.pair.new.get("Apple", "US"), Some(3_000_000.0));
}

#[test]
fn test_row_diff_completeness() {
    let old_csv = "Brand,Region,Sales\nApple,US,10\nVivo,US,4\nHonor,China,7\n";
    let new_csv = "Brand,Region,Sales\nVivo,US,6\nHonor,China,7\nOppo,India,2\n";
    let old = RowTable::from_raw_rows(&read_csv_rows(old_csv.as_bytes()).unwrap());
    let new = RowTable::from_raw_rows(&read_csv_rows(new_csv.as_bytes()).unwrap());
    let keys = labels(&["Brand", "Region"]);

    let report = diff(Some(&old), Some(&new), &keys, "Sales", DiffOptions::default()).unwrap();
    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.deleted[0].key, labels(&["Apple", "US"]));
    assert_eq!(report.changed.len(), 1);
    assert_eq!(report.changed[0].delta, Some(2.0));
    assert!(report.added.is_empty());
    assert_eq!(report.summary.added_count, 1);
    assert_eq!(report.summary.unchanged_count, 1);

    let with_added = diff(Some(&old), Some(&new), &keys, "Sales", DiffOptions { report_added: true }).unwrap();
    assert_eq!(with_added.added.len(), 1);
    assert_eq!(with_added.added[0].key, labels(&["Oppo", "India"]));

    let first_load = diff(None, Some(&new), &keys, "Sales", DiffOptions::default()).unwrap();
    assert!(!first_load.has_differences());
}

#[test]
fn test_growth_on_zero_baseline() {
    let old = AggregateTable::from_rows(labels(&["A", "B"]), labels(&["US"]), vec![vec![0.0], vec![0.0]]).unwrap();
    let new = AggregateTable::from_rows(labels(&["A", "B"]), labels(&["US"]), vec![vec![5.0], vec![0.0]]).unwrap();
    let comparison = compare_tables(&old, &new).unwrap();
    assert_eq!(comparison.growth.get("A", "US"), Some(Growth::New));
    assert_eq!(comparison.growth.get("B", "US"), Some(Growth::Pct(0.0)));
    assert_eq!(comparison.diff.get("A", "US"), Some(5.0));
}

#[test]
fn test_launch_alignment_with_cap() {
    let records = vec![
        Record::new("Galaxy", 2023, 0.0).with_sub_entity("S23").with_month(1),
        Record::new("Galaxy", 2023, 100.0).with_sub_entity("S23").with_month(3),
        Record::new("Galaxy", 2023, 50.0).with_sub_entity("S23").with_month(5),
        Record::new("Galaxy", 2023, 10.0).with_sub_entity("S23").with_month(10),
    ];
    let request = LaunchRequest::new(PivotField::SubEntity, Granularity::Month).with_cap(5);

    let aligned = align_to_launch(&records, &request).unwrap();
    assert_eq!(aligned.len(), 1);
    let s23 = &aligned[0];
    assert_eq!(s23.launch_label, "2023-03");
    assert_eq!(s23.series.len(), 6);
    assert_eq!(s23.series.get(0), Some(100.0));
    assert_eq!(s23.series.get(1), None);
    assert_eq!(s23.series.get(2), Some(50.0));
    assert_eq!(s23.series.total(), 150.0);
}

#[test]
fn test_sell_in_layout_residuals() {
    let config = EngineConfig::default().with_brands(BrandAliases::sell_in_groups());
    let records = vec![
        Record::new("Apple", 2025, 10.0).with_dimension("China"),
        Record::new("MX", 2025, 20.0).with_dimension("China"),
        Record::new("Apple", 2025, 5.0).with_dimension("Brazil"),
        Record::new("Others_Calc", 2025, 7.0).with_dimension("Brazil"),
        Record::new("Apple", 2024, 8.0).with_dimension("China"),
    ];

    let pair = sell_in_layout(&records, &config, &SellInRequest::default()).unwrap();
    let current = &pair.new;
    assert_eq!(
        current.row_labels(),
        &labels(&["Total", "China", "India", "US", "W.Europe", "Others"])[..]
    );
    assert_eq!(current.col_labels().first().map(String::as_str), Some("Total"));
    assert_eq!(current.col_labels().last().map(String::as_str), Some("Others"));

    assert_eq!(current.get("Total", "Total"), Some(42.0));
    assert_eq!(current.get("China", "Total"), Some(30.0));
    assert_eq!(current.get("China", "Others"), Some(0.0));
    assert_eq!(current.get("Others", "Apple"), Some(5.0));
    assert_eq!(current.get("Others", "Others"), Some(7.0));
    assert_eq!(current.get("India", "Apple"), Some(0.0));
    assert_eq!(pair.old.get("China", "Apple"), Some(8.0));

    let export = side_by_side(&pair.old, &pair.new, "2024", "2025", &config).unwrap();
    assert_eq!(export.get("Apple", "China | Diff"), Some(2.0));
}
