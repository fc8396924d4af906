//! Launch Alignment
//!
//! Re-indexes each entity's series to "periods since launch", where launch
//! is the first period with a strictly positive aggregated value.

use crate::core::engine::pivot::PivotField;
use crate::core::models::{natural_cmp, Granularity, IndexedSeries, Record};
use crate::error::{IntelError, Result};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Field identifying the aligned entity (usually the model)
    pub entity_field: PivotField,
    pub granularity: Granularity,

    /// Last offset kept; later values are dropped
    pub max_offset: Option<i64>,

    /// Running sum instead of per-period values
    pub cumulative: bool,
}

impl LaunchRequest {
    pub fn new(entity_field: PivotField, granularity: Granularity) -> Self {
        Self {
            entity_field,
            granularity,
            max_offset: None,
            cumulative: false,
        }
    }

    pub fn with_cap(mut self, max_offset: i64) -> Self {
        self.max_offset = Some(max_offset);
        self
    }

    pub fn cumulative(mut self) -> Self {
        self.cumulative = true;
        self
    }
}

/// One entity's launch-relative series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchSeries {
    pub entity: String,
    pub launch_year: i32,
    pub launch_period: u32,

    /// Display label of the launch period, e.g. `2023-03`
    pub launch_label: String,

    /// Offsets `0..=cap` (or up to the last observation without a cap)
    pub series: IndexedSeries,
}

/// Align every entity in `records` to its launch period
///
/// Entities that never have a positive value are omitted. Records lacking
/// the entity field or the requested period are ignored.
pub fn align_to_launch(records: &[Record], request: &LaunchRequest) -> Result<Vec<LaunchSeries>> {
    if let Some(cap) = request.max_offset {
        if cap < 0 {
            return Err(IntelError::Config(format!("max_offset must be >= 0, got {}", cap)));
        }
    }
    let g = request.granularity;

    // Step 1: Aggregate per entity and (year, period)
    let mut by_entity: BTreeMap<String, BTreeMap<(i32, u32), f64>> = BTreeMap::new();
    let mut off_calendar = 0usize;
    for record in records {
        let entity = match request.entity_field.value_of(record) {
            Some(e) => e,
            None => continue,
        };
        let period = match record.period(g) {
            Some(p) if g.is_valid(p) => p,
            _ => continue,
        };
        if !on_calendar(g, record.year, period) {
            off_calendar += 1;
            continue;
        }
        *by_entity
            .entry(entity)
            .or_default()
            .entry((record.year, period))
            .or_insert(0.0) += record.value;
    }
    if off_calendar > 0 {
        warn!("{} record(s) dropped: {:?} period not in the calendar year", off_calendar, g);
    }

    let mut out = Vec::new();
    for (entity, periods) in by_entity {
        // Step 2: Launch = first strictly positive period
        let (launch_year, launch_period) = match periods.iter().find(|(_, v)| **v > 0.0) {
            Some((key, _)) => *key,
            None => {
                debug!("'{}' has no positive value; not aligned", entity);
                continue;
            }
        };

        // Step 3: Offsets, dropping pre-launch and post-cap periods
        let mut points: BTreeMap<i64, f64> = BTreeMap::new();
        for ((year, period), value) in &periods {
            let offset = match period_offset(g, (launch_year, launch_period), (*year, *period)) {
                Some(o) if o >= 0 => o,
                _ => continue,
            };
            if request.max_offset.map_or(false, |cap| offset > cap) {
                continue;
            }
            *points.entry(offset).or_insert(0.0) += value;
        }

        // Step 4: Contiguous index
        let end = request
            .max_offset
            .unwrap_or_else(|| points.keys().next_back().copied().unwrap_or(0));
        let mut series = IndexedSeries::contiguous(entity.clone(), &points, 0, end);
        if request.cumulative {
            series = series.cumulative();
        }

        out.push(LaunchSeries {
            launch_label: g.label(launch_year, launch_period),
            entity,
            launch_year,
            launch_period,
            series,
        });
    }

    out.sort_by(|a, b| natural_cmp(&a.entity, &b.entity));
    Ok(out)
}

/// Periods from `launch` to `at` at the given granularity
///
/// Weeks are counted on the ISO calendar. `None` when either week does not
/// exist in its ISO year (e.g. week 53 of 2024).
pub fn period_offset(granularity: Granularity, launch: (i32, u32), at: (i32, u32)) -> Option<i64> {
    let (ly, lp) = launch;
    let (y, p) = at;
    let linear = |per_year: i64| (y - ly) as i64 * per_year + (p as i64 - lp as i64);
    match granularity {
        Granularity::Month => Some(linear(12)),
        Granularity::Quarter => Some(linear(4)),
        Granularity::Week => {
            let from = iso_monday(ly, lp)?;
            let to = iso_monday(y, p)?;
            Some((to - from).num_days() / 7)
        }
    }
}

fn iso_monday(year: i32, week: u32) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
}

fn on_calendar(granularity: Granularity, year: i32, period: u32) -> bool {
    match granularity {
        Granularity::Week => iso_monday(year, period).is_some(),
        _ => true,
    }
}
