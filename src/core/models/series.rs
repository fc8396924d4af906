//! Integer-indexed series with explicit gaps

use serde::Serialize;
use std::collections::BTreeMap;

/// A labelled series over a contiguous integer index
///
/// Missing points are `None`, never an implied zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedSeries {
    pub label: String,
    pub index: Vec<i64>,
    pub values: Vec<Option<f64>>,
}

impl IndexedSeries {
    /// Series over `start..=end`, with points absent from `points` left missing
    pub fn contiguous(label: impl Into<String>, points: &BTreeMap<i64, f64>, start: i64, end: i64) -> Self {
        let index: Vec<i64> = if end >= start { (start..=end).collect() } else { Vec::new() };
        let values = index.iter().map(|i| points.get(i).copied()).collect();
        Self {
            label: label.into(),
            index,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, idx: i64) -> Option<f64> {
        self.index
            .iter()
            .position(|i| *i == idx)
            .and_then(|pos| self.values[pos])
    }

    /// Running sum where a missing point contributes zero
    pub fn cumulative(&self) -> Self {
        let mut running = 0.0;
        let values = self
            .values
            .iter()
            .map(|v| {
                running += v.unwrap_or(0.0);
                Some(running)
            })
            .collect();
        Self {
            label: self.label.clone(),
            index: self.index.clone(),
            values,
        }
    }

    /// Sum of the observed points
    pub fn total(&self) -> f64 {
        self.values.iter().flatten().sum()
    }
}
