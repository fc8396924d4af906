//! Canonical Record Model
//!
//! A `Record` is one normalized observation. Raw rows coming from a
//! reader are maps of column name to `RawValue`; the normalizer turns
//! them into records.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A primitive cell value as handed over by a spreadsheet reader
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

/// One raw row: column name -> cell
pub type RawRow = BTreeMap<String, RawValue>;

impl RawValue {
    pub fn text(value: impl Into<String>) -> Self {
        RawValue::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Canonical string used for key comparison
    ///
    /// Integral numbers print without a fractional part so that `2024.0`
    /// and `"2024"` compare equal.
    pub fn key_string(&self) -> String {
        match self {
            RawValue::Empty => String::new(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::Number(n) => format_number(*n),
            RawValue::Text(s) => s.trim().to_string(),
            RawValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value)
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Time bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
    Quarter,
}

impl Granularity {
    /// Number of periods in a full (non-leap-week) year
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Granularity::Week => 52,
            Granularity::Month => 12,
            Granularity::Quarter => 4,
        }
    }

    pub fn is_valid(&self, period: u32) -> bool {
        match self {
            Granularity::Week => (1..=53).contains(&period),
            Granularity::Month => (1..=12).contains(&period),
            Granularity::Quarter => (1..=4).contains(&period),
        }
    }

    /// Display label of a (year, period) pair, e.g. `2024 3Q`, `2024-03`, `2024 W05`
    pub fn label(&self, year: i32, period: u32) -> String {
        match self {
            Granularity::Week => format!("{} W{:02}", year, period),
            Granularity::Month => format!("{}-{:02}", year, period),
            Granularity::Quarter => format!("{} {}Q", year, period),
        }
    }
}

/// One normalized observation
///
/// `value` is always in raw units (never pre-divided for display).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Brand / vendor after alias folding
    pub entity: String,

    /// Model, when the source carries one
    pub sub_entity: Option<String>,

    /// Region, when the source carries one
    pub dimension: Option<String>,

    pub year: i32,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub quarter: Option<u32>,

    /// Sales units
    pub value: f64,

    /// Extra categorical columns (e.g. Category = Smartphone/Foldable)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Record {
    pub fn new(entity: impl Into<String>, year: i32, value: f64) -> Self {
        Self {
            entity: entity.into(),
            sub_entity: None,
            dimension: None,
            year,
            month: None,
            week: None,
            quarter: None,
            value,
            attributes: BTreeMap::new(),
        }
    }

    /// Record dated by a calendar day (year, month and quarter derived)
    pub fn on_date(entity: impl Into<String>, date: NaiveDate, value: f64) -> Self {
        Self::new(entity, date.year(), value).with_month(date.month())
    }

    /// Set the month; the quarter follows from it
    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self.quarter = Some(quarter_of_month(month));
        self
    }

    pub fn with_week(mut self, week: u32) -> Self {
        self.week = Some(week);
        self
    }

    pub fn with_quarter(mut self, quarter: u32) -> Self {
        self.quarter = Some(quarter);
        self
    }

    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    pub fn with_sub_entity(mut self, sub_entity: impl Into<String>) -> Self {
        self.sub_entity = Some(sub_entity.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Period index at the given granularity, if known
    pub fn period(&self, granularity: Granularity) -> Option<u32> {
        match granularity {
            Granularity::Week => self.week,
            Granularity::Month => self.month,
            Granularity::Quarter => self.quarter,
        }
    }

    pub fn period_label(&self, granularity: Granularity) -> Option<String> {
        self.period(granularity)
            .map(|p| granularity.label(self.year, p))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}

pub fn quarter_of_month(month: u32) -> u32 {
    (month.clamp(1, 12) - 1) / 3 + 1
}

/// Record selection used by the trend and launch views
///
/// A `None` field, or a field equal to the configured total label, does
/// not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub entity: Option<String>,
    pub sub_entities: Option<Vec<String>>,
    pub dimension: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    pub fn sub_entities(mut self, models: Vec<String>) -> Self {
        self.sub_entities = Some(models);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn matches(&self, record: &Record, total_label: &str) -> bool {
        let selects = |wanted: &Option<String>, actual: Option<&str>| match wanted {
            None => true,
            Some(w) if w == total_label => true,
            Some(w) => actual == Some(w.as_str()),
        };

        if !selects(&self.entity, Some(record.entity.as_str())) {
            return false;
        }
        if !selects(&self.dimension, record.dimension.as_deref()) {
            return false;
        }
        if let Some(models) = &self.sub_entities {
            // An empty selection keeps every model
            if !models.is_empty() {
                match &record.sub_entity {
                    Some(m) if models.contains(m) => {}
                    _ => return false,
                }
            }
        }
        self.attributes
            .iter()
            .all(|(name, value)| record.attribute(name) == Some(value.as_str()))
    }

    pub fn apply<'a>(&self, records: &'a [Record], total_label: &str) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|r| self.matches(r, total_label))
            .collect()
    }
}
