//! Snapshot versioning from export file names
//!
//! Export files carry their as-of date in the name in many shapes
//! (`sellout_2024_w12.xlsx`, `Tracker 3Q24.xlsx`, `SI_0315_24.xlsx`).
//! Versions compare lexicographically so a newer export can replace an
//! older one but never the reverse.

use crate::error::{IntelError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;

lazy_static! {
    static ref YEAR4: Regex = Regex::new(r"(20[2-3]\d)").expect("year pattern");
    static ref YEAR2: Regex = Regex::new(r"(?:['q_]|^)(2[0-9])(?:[^\d]|$)").expect("short year pattern");
    static ref WEEKS: Regex = Regex::new(r"(\d{1,2})\s*weeks?").expect("weeks pattern");
    static ref WEEK_TOKEN: Regex = Regex::new(r"w(\d{1,2})").expect("week token pattern");
    static ref QUARTER: Regex = Regex::new(r"([1-4])q|q([1-4])").expect("quarter pattern");
    static ref DIGITS: Regex = Regex::new(r"\d+").expect("digits pattern");
}

const MONTHS: [(&str, i64); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

/// Orderable version derived from a file name
///
/// Usually `(year, sub-unit, day)`; names without a recognizable year fall
/// back to every digit run in order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SnapshotVersion(Vec<i64>);

impl SnapshotVersion {
    /// Version of a missing file; older than anything
    pub fn absent() -> Self {
        SnapshotVersion(vec![-1, -1, -1])
    }

    pub fn parts(&self) -> &[i64] {
        &self.0
    }

    pub fn from_path(path: Option<&Path>) -> Self {
        match path.and_then(|p| p.file_name()).map(|n| n.to_string_lossy()) {
            Some(name) if !name.is_empty() => Self::from_file_name(&name),
            _ => Self::absent(),
        }
    }

    pub fn from_file_name(name: &str) -> Self {
        if name.is_empty() {
            return Self::absent();
        }
        let name = name.to_lowercase();

        // Step 1: Year
        let year = capture_int(&YEAR4, &name, 1).or_else(|| capture_int(&YEAR2, &name, 1).map(|yy| 2000 + yy));

        // Step 2: Sub-unit (week, month, quarter)
        let mut day = 0;
        let mut sub_unit = capture_int(&WEEKS, &name, 1)
            .or_else(|| capture_int(&WEEK_TOKEN, &name, 1))
            .or_else(|| MONTHS.iter().find(|(m, _)| name.contains(m)).map(|(_, n)| *n))
            .or_else(|| {
                QUARTER.captures(&name).and_then(|c| {
                    c.get(1)
                        .or_else(|| c.get(2))
                        .and_then(|m| m.as_str().parse::<i64>().ok())
                        .map(|q| q * 3)
                })
            })
            .unwrap_or(0);

        // Step 3: mmdd token before the two-digit year
        if let Some(year) = year {
            if sub_unit == 0 {
                let yy = format!("{:02}", year % 100);
                let pattern = format!(r"(\d{{3,4}})[\s_'\-]*{}", yy);
                if let Ok(re) = Regex::new(&pattern) {
                    if let Some(val) = capture_int(&re, &name, 1) {
                        if (100..=1231).contains(&val) {
                            sub_unit = val / 100;
                            day = val % 100;
                        }
                    }
                }
            }
        }

        match year {
            Some(year) => SnapshotVersion(vec![year, sub_unit, day]),
            None => {
                let digits: Vec<i64> = DIGITS
                    .find_iter(&name)
                    .filter_map(|m| m.as_str().parse::<i64>().ok())
                    .collect();
                if digits.is_empty() {
                    SnapshotVersion(vec![0, 0, 0])
                } else {
                    SnapshotVersion(digits)
                }
            }
        }
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

fn capture_int(re: &Regex, text: &str, group: usize) -> Option<i64> {
    re.captures(text)
        .and_then(|c| c.get(group))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Accept `incoming` only when it is not older than `current`
///
/// Ties are accepted. Returns the incoming version.
pub fn ensure_not_older(current: Option<&Path>, incoming: &Path) -> Result<SnapshotVersion> {
    let current_version = SnapshotVersion::from_path(current);
    let incoming_version = SnapshotVersion::from_path(Some(incoming));
    if incoming_version < current_version {
        return Err(IntelError::StaleSnapshot {
            current: format!(
                "{} ({})",
                current.map(|p| p.display().to_string()).unwrap_or_default(),
                current_version
            ),
            incoming: format!("{} ({})", incoming.display(), incoming_version),
        });
    }
    Ok(incoming_version)
}
