//! Record Canonicalization
//!
//! Maps raw reader rows to canonical `Record`s for aggregation:
//! - Brand alias folding (via the configured alias table)
//! - Lenient numeric coercion (malformed cells become 0, never an error)
//! - Period derivation from year/month/week/quarter columns or a date
//! - Dimension exclusion and sheet-implied dimensions

use crate::config::EngineConfig;
use crate::core::models::{quarter_of_month, RawRow, RawValue, Record};
use crate::error::{IntelError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

lazy_static! {
    static ref QUARTER_TOKEN: Regex = Regex::new(
        r"(?i)^\s*(?:(\d{4})\s*)?(?:q\s*([1-4])|([1-4])\s*q)(?:\s*'?\s*(\d{2}))?\s*$"
    )
    .expect("quarter token pattern");
    static ref MONTH_NAME: Regex = Regex::new(
        r"(?i)(?:^|[^a-z])(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)"
    )
    .expect("month name pattern");
}

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const DATE_FORMATS: [&str; 6] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Which source columns feed which record fields
///
/// Optional columns that are named here but absent from a row are simply
/// treated as empty. `entity` and `value` are required in every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub entity: String,
    pub sub_entity: Option<String>,
    pub dimension: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub week: Option<String>,
    pub quarter: Option<String>,
    pub date: Option<String>,
    pub value: String,

    /// Extra categorical columns copied into `Record::attributes`
    pub attributes: Vec<String>,

    /// Dimension used when a row carries none
    pub fixed_dimension: Option<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            entity: "Brand".to_string(),
            sub_entity: Some("Model".to_string()),
            dimension: Some("Region".to_string()),
            year: Some("Year".to_string()),
            month: Some("Month".to_string()),
            week: Some("Week".to_string()),
            quarter: Some("Quarter".to_string()),
            date: Some("Date".to_string()),
            value: "Sales".to_string(),
            attributes: vec!["Category".to_string()],
            fixed_dimension: None,
        }
    }
}

impl ColumnMapping {
    fn time_columns(&self) -> Vec<&String> {
        [&self.year, &self.date, &self.quarter, &self.month]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Counters describing one normalization run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeReport {
    pub rows_in: usize,
    pub records_out: usize,

    /// Rows dropped because no year could be derived
    pub missing_period: usize,

    /// Rows dropped because their dimension is on the exclusion list
    pub excluded: usize,

    /// Rows whose explicit year/month disagreed with their date column
    pub period_conflicts: usize,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub records: Vec<Record>,
    pub report: NormalizeReport,
}

/// Record canonicalizer
///
/// Holds the configuration and column mapping; normalizing is a pure
/// function of its input rows.
pub struct RecordCanonicalizer<'a> {
    config: &'a EngineConfig,
    mapping: ColumnMapping,
}

impl<'a> RecordCanonicalizer<'a> {
    pub fn new(config: &'a EngineConfig, mapping: ColumnMapping) -> Self {
        Self { config, mapping }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Normalize rows of a single source
    pub fn normalize(&self, rows: &[RawRow]) -> Result<Normalized> {
        self.normalize_inner(rows, self.mapping.fixed_dimension.clone(), "rows")
    }

    /// Normalize rows read from a named sheet
    ///
    /// Rows without a dimension take the one implied by the sheet name.
    pub fn normalize_sheet(&self, sheet: &str, rows: &[RawRow]) -> Result<Normalized> {
        let fixed = self
            .mapping
            .fixed_dimension
            .clone()
            .or_else(|| Some(self.config.dimension_for_sheet(sheet)));
        self.normalize_inner(rows, fixed, sheet)
    }

    fn normalize_inner(&self, rows: &[RawRow], fixed: Option<String>, source: &str) -> Result<Normalized> {
        let mut report = NormalizeReport {
            rows_in: rows.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(rows.len());

        for (idx, row) in rows.iter().enumerate() {
            // Step 1: Required columns
            let missing = self.missing_columns(row);
            if !missing.is_empty() {
                return Err(IntelError::schema_mismatch(format!("{} row {}", source, idx), missing));
            }

            // Step 2: Canonical fields
            if let Some(record) = self.canonicalize_row(row, fixed.as_deref(), &mut report) {
                records.push(record);
            }
        }

        report.records_out = records.len();
        if report.period_conflicts > 0 {
            warn!(
                "{}: {} row(s) had explicit period columns disagreeing with their date; explicit columns kept",
                source, report.period_conflicts
            );
        }
        if report.missing_period > 0 {
            warn!("{}: dropped {} row(s) without a derivable year", source, report.missing_period);
        }
        debug!(
            "{}: normalized {} of {} rows ({} excluded)",
            source, report.records_out, report.rows_in, report.excluded
        );

        Ok(Normalized { records, report })
    }

    fn missing_columns(&self, row: &RawRow) -> Vec<String> {
        let mut missing = Vec::new();
        for required in [&self.mapping.entity, &self.mapping.value] {
            if !row.contains_key(required) {
                missing.push(required.clone());
            }
        }
        let time_columns = self.mapping.time_columns();
        if !time_columns.is_empty() && !time_columns.iter().any(|c| row.contains_key(c.as_str())) {
            missing.extend(time_columns.into_iter().cloned());
        }
        missing
    }

    fn cell<'r>(&self, row: &'r RawRow, column: &Option<String>) -> Option<&'r RawValue> {
        column.as_ref().and_then(|c| row.get(c))
    }

    fn canonicalize_row(&self, row: &RawRow, fixed: Option<&str>, report: &mut NormalizeReport) -> Option<Record> {
        let entity_raw = row.get(&self.mapping.entity).map(|v| v.key_string()).unwrap_or_default();
        let entity = self.config.brands.canonicalize(&entity_raw);

        let dimension = self
            .cell(row, &self.mapping.dimension)
            .and_then(cell_text)
            .or_else(|| fixed.map(|f| f.to_string()));
        if let Some(dim) = &dimension {
            if self.config.is_excluded_dimension(dim) {
                report.excluded += 1;
                return None;
            }
        }

        let value = row.get(&self.mapping.value).map(coerce_number).unwrap_or(0.0);

        // Explicit period columns win over the date column
        let date = self.cell(row, &self.mapping.date).and_then(parse_date);
        let month_cell = self.cell(row, &self.mapping.month);
        let explicit_month = month_cell.and_then(parse_month_token);
        let explicit_year = self.cell(row, &self.mapping.year).and_then(parse_year);
        let quarter_token = self.cell(row, &self.mapping.quarter).and_then(parse_quarter_token);

        if let Some(d) = date {
            let month_conflict = explicit_month.map_or(false, |m| m != d.month());
            let year_conflict = explicit_year.map_or(false, |y| y != d.year());
            if month_conflict || year_conflict {
                report.period_conflicts += 1;
                debug!(
                    "period conflict for {}: date {} vs year {:?} month {:?}",
                    entity, d, explicit_year, explicit_month
                );
            }
        }

        let year = explicit_year
            .or_else(|| date.map(|d| d.year()))
            .or_else(|| quarter_token.and_then(|(y, _)| y))
            .or_else(|| month_cell.and_then(parse_date).map(|d| d.year()));
        let year = match year {
            Some(y) => y,
            None => {
                report.missing_period += 1;
                return None;
            }
        };

        let month = explicit_month.or_else(|| date.map(|d| d.month()));
        let quarter = quarter_token
            .map(|(_, q)| q)
            .or_else(|| month.map(quarter_of_month));
        let week = self.cell(row, &self.mapping.week).and_then(parse_week);

        let mut record = Record::new(entity, year, value);
        record.month = month;
        record.quarter = quarter;
        record.week = week;
        record.dimension = dimension;
        record.sub_entity = self.cell(row, &self.mapping.sub_entity).and_then(cell_text);
        for attribute in &self.mapping.attributes {
            if let Some(text) = row.get(attribute).and_then(cell_text) {
                record.attributes.insert(attribute.clone(), text);
            }
        }
        Some(record)
    }
}

fn cell_text(value: &RawValue) -> Option<String> {
    let text = value.key_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Numeric coercion: anything unparseable becomes 0
pub fn coerce_number(value: &RawValue) -> f64 {
    match value {
        RawValue::Number(n) if n.is_finite() => *n,
        RawValue::Text(s) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .unwrap_or(0.0),
        RawValue::Bool(true) => 1.0,
        _ => 0.0,
    }
}

/// Parse a calendar date from a cell
///
/// Text is tried as a `yymmdd` week-range head ("240301-240307") first,
/// then full dates, date-times and finally month-level strings
/// ("2024-03", "Mar 2024", "Mar-24"). Six-digit whole numbers are read as
/// `yymmdd` (a CSV cell `240301` arrives as a number); numbers in the
/// spreadsheet serial range are read as serial day counts.
pub fn parse_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Date(d) => Some(*d),
        RawValue::Number(n) if n.fract() == 0.0 && (100_000.0..=999_999.0).contains(n) => {
            NaiveDate::parse_from_str(&format!("{:06}", *n as i64), "%y%m%d").ok()
        }
        RawValue::Number(n) if (20_000.0..=80_000.0).contains(n) => {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            epoch.checked_add_signed(Duration::days(n.floor() as i64))
        }
        RawValue::Text(s) => parse_date_str(s),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let head = s.split('-').next().unwrap_or("").trim();
    if head.len() == 6 && head.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(head, "%y%m%d") {
            return Some(d);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    let month_level = [
        (format!("{}-01", s), "%Y-%m-%d"),
        (format!("{}/01", s), "%Y/%m/%d"),
        (format!("01 {}", s), "%d %b %Y"),
        (format!("01 {}", s), "%d %B %Y"),
        (format!("01 {}", s), "%d %b %y"),
        (format!("01-{}", s), "%d-%b-%y"),
        (format!("01-{}", s), "%d-%b-%Y"),
    ];
    month_level
        .iter()
        .find_map(|(text, fmt)| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Parse a month number from a month cell
///
/// Order: integer/float tokens, month-name keywords, then generic date
/// parsing. Returns `None` for anything outside 1..=12.
pub fn parse_month_token(value: &RawValue) -> Option<u32> {
    match value {
        RawValue::Number(n) => {
            if n.fract() == 0.0 && (1.0..=12.0).contains(n) {
                Some(*n as u32)
            } else {
                parse_date(value).map(|d| d.month())
            }
        }
        RawValue::Date(d) => Some(d.month()),
        RawValue::Text(s) => {
            let s = s.trim().to_lowercase();
            if s.is_empty() {
                return None;
            }
            if let Ok(n) = s.parse::<f64>() {
                if n.fract() == 0.0 && (1.0..=12.0).contains(&n) {
                    return Some(n as u32);
                }
            }
            if let Some(caps) = MONTH_NAME.captures(&s) {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                if let Some(pos) = MONTH_NAMES.iter().position(|m| *m == name) {
                    return Some(pos as u32 + 1);
                }
            }
            parse_date_str(&s).map(|d| d.month())
        }
        _ => None,
    }
}

/// Parse a quarter token: `Q3`, `3Q`, `2024 3Q`, `2024 Q3`, `3Q24`
///
/// Returns the year when the token carries one.
pub fn parse_quarter_token(value: &RawValue) -> Option<(Option<i32>, u32)> {
    match value {
        RawValue::Number(n) if n.fract() == 0.0 && (1.0..=4.0).contains(n) => Some((None, *n as u32)),
        RawValue::Date(d) => Some((Some(d.year()), quarter_of_month(d.month()))),
        RawValue::Text(s) => {
            let caps = QUARTER_TOKEN.captures(s)?;
            let quarter = caps
                .get(2)
                .or_else(|| caps.get(3))
                .and_then(|m| m.as_str().parse::<u32>().ok())?;
            let year = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<i32>().ok())
                .or_else(|| {
                    caps.get(4)
                        .and_then(|m| m.as_str().parse::<i32>().ok())
                        .map(|yy| 2000 + yy)
                });
            Some((year, quarter))
        }
        _ => None,
    }
}

/// Parse a four-digit calendar year
pub fn parse_year(value: &RawValue) -> Option<i32> {
    let n = match value {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        RawValue::Date(d) => return Some(d.year()),
        _ => return None,
    };
    if n.fract() == 0.0 && (1900.0..=2100.0).contains(&n) {
        Some(n as i32)
    } else {
        None
    }
}

/// Parse a week number (`12`, `12.0`, `W12`)
pub fn parse_week(value: &RawValue) -> Option<u32> {
    let n = match value {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => s
            .trim()
            .trim_start_matches(&['W', 'w'][..])
            .parse::<f64>()
            .ok()?,
        _ => return None,
    };
    if n.fract() == 0.0 && (1.0..=53.0).contains(&n) {
        Some(n as u32)
    } else {
        None
    }
}
