use market_intel::config::EngineConfig;
use market_intel::core::engine::{diff, pivot, ColumnMapping, DiffOptions, PivotField, PivotSpec, RecordCanonicalizer, RowTable};
use market_intel::core::metrics::{align_to_launch, LaunchRequest};
use market_intel::core::models::{Granularity, Record};
use market_intel::ingestion::{read_csv_file, sheet_name};
use market_intel::pipeline::{yoy_heatmap, HeatmapRequest};
use market_intel::version::ensure_not_older;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "market-intel")]
#[command(about = "Snapshot reconciliation and cross-tab views for market sell-through exports")]
#[command(version)]
struct Args {
    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Column mapping (JSON); defaults to Brand/Model/Region/Year/Month/Week/Quarter/Date/Sales
    #[arg(long, global = true)]
    mapping: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a CSV export into a cross-tab
    Pivot {
        input: PathBuf,

        #[arg(long, value_enum, num_args = 1.., default_values = ["entity"])]
        rows: Vec<FieldArg>,

        #[arg(long, value_enum, num_args = 0.., default_values = ["dimension"])]
        columns: Vec<FieldArg>,

        /// Mean instead of sum
        #[arg(long)]
        mean: bool,

        /// Append Total row and column
        #[arg(long)]
        totals: bool,
    },
    /// Row-level diff of two snapshots of the same export
    Diff {
        /// Previous snapshot; omit for a first load
        #[arg(long)]
        old: Option<PathBuf>,

        new: PathBuf,

        /// Key column (repeatable)
        #[arg(long = "key", required = true)]
        keys: Vec<String>,

        /// Compared value column
        #[arg(long)]
        value: String,

        /// Also report keys only present in the new snapshot
        #[arg(long)]
        report_added: bool,
    },
    /// Year-over-year entity x dimension heatmap
    Heatmap {
        input: PathBuf,

        #[arg(long)]
        current_year: Option<i32>,

        /// Period granularity for year-to-date truncation
        #[arg(long, value_enum, default_value = "week")]
        ytd: GranularityArg,

        /// Fixed cutoff period instead of the latest one in the current year
        #[arg(long)]
        cutoff: Option<u32>,

        /// Compare full years
        #[arg(long)]
        full_year: bool,

        /// Long-tail threshold; defaults to the configured value
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Launch-aligned series per model
    Launch {
        input: PathBuf,

        #[arg(long, value_enum, default_value = "sub-entity")]
        by: FieldArg,

        #[arg(long, value_enum, default_value = "month")]
        granularity: GranularityArg,

        /// Last offset kept
        #[arg(long)]
        cap: Option<i64>,

        #[arg(long)]
        cumulative: bool,
    },
    /// Check that an incoming export is not older than the current one
    Version {
        incoming: PathBuf,

        #[arg(long)]
        current: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FieldArg {
    Entity,
    SubEntity,
    Dimension,
    Year,
    Month,
    Week,
    Quarter,
    WeekLabel,
    MonthLabel,
    QuarterLabel,
}

impl From<FieldArg> for PivotField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Entity => PivotField::Entity,
            FieldArg::SubEntity => PivotField::SubEntity,
            FieldArg::Dimension => PivotField::Dimension,
            FieldArg::Year => PivotField::Year,
            FieldArg::Month => PivotField::Month,
            FieldArg::Week => PivotField::Week,
            FieldArg::Quarter => PivotField::Quarter,
            FieldArg::WeekLabel => PivotField::PeriodLabel(Granularity::Week),
            FieldArg::MonthLabel => PivotField::PeriodLabel(Granularity::Month),
            FieldArg::QuarterLabel => PivotField::PeriodLabel(Granularity::Quarter),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GranularityArg {
    Week,
    Month,
    Quarter,
}

impl From<GranularityArg> for Granularity {
    fn from(arg: GranularityArg) -> Self {
        match arg {
            GranularityArg::Week => Granularity::Week,
            GranularityArg::Month => Granularity::Month,
            GranularityArg::Quarter => Granularity::Quarter,
        }
    }
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mapping = match &args.mapping {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading mapping {}", path.display()))?;
            serde_json::from_str::<ColumnMapping>(&text)?
        }
        None => ColumnMapping::default(),
    };

    match args.command {
        Commands::Pivot {
            input,
            rows,
            columns,
            mean,
            totals,
        } => {
            let records = load_records(&input, &config, &mapping)?;
            let mut spec = PivotSpec::new(
                rows.into_iter().map(PivotField::from).collect(),
                columns.into_iter().map(PivotField::from).collect(),
            );
            if mean {
                spec = spec.mean();
            }
            if totals {
                spec = spec.with_totals();
            }
            emit(&pivot(&records, &config, &spec)?)
        }
        Commands::Diff {
            old,
            new,
            keys,
            value,
            report_added,
        } => {
            let old_table = match &old {
                Some(path) => Some(RowTable::from_raw_rows(&read_csv_file(path)?)),
                None => None,
            };
            let new_table = RowTable::from_raw_rows(&read_csv_file(&new)?);
            let report = diff(old_table.as_ref(), Some(&new_table), &keys, &value, DiffOptions { report_added })?;
            info!(
                "{} deleted, {} changed, {} added",
                report.summary.deleted_count, report.summary.changed_count, report.summary.added_count
            );
            emit(&report)
        }
        Commands::Heatmap {
            input,
            current_year,
            ytd,
            cutoff,
            full_year,
            threshold,
        } => {
            let records = load_records(&input, &config, &mapping)?;
            let request = HeatmapRequest {
                current_year,
                ytd: if full_year { None } else { Some(ytd.into()) },
                cutoff,
                threshold,
                ..Default::default()
            };
            emit(&yoy_heatmap(&records, &config, &request)?)
        }
        Commands::Launch {
            input,
            by,
            granularity,
            cap,
            cumulative,
        } => {
            let records = load_records(&input, &config, &mapping)?;
            let mut request = LaunchRequest::new(by.into(), granularity.into());
            if let Some(cap) = cap {
                request = request.with_cap(cap);
            }
            if cumulative {
                request = request.cumulative();
            }
            emit(&align_to_launch(&records, &request)?)
        }
        Commands::Version { incoming, current } => {
            let version = ensure_not_older(current.as_deref(), &incoming)?;
            println!("{}", version);
            Ok(())
        }
    }
}

fn load_records(path: &Path, config: &EngineConfig, mapping: &ColumnMapping) -> Result<Vec<Record>> {
    let rows = read_csv_file(path).with_context(|| format!("reading {}", path.display()))?;
    let normalized = RecordCanonicalizer::new(config, mapping.clone()).normalize_sheet(&sheet_name(path), &rows)?;
    info!(
        "{}: {} row(s) in, {} record(s) out",
        path.display(),
        normalized.report.rows_in,
        normalized.report.records_out
    );
    Ok(normalized.records)
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
