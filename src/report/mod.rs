//! Before/after comparison of two stat snapshots and its renderings.

pub mod chart;
pub mod diff;

use crate::models::{StatField, StatSnapshot};
use crate::Result;

pub use chart::ChartRenderer;
pub use diff::DiffRenderer;

/// Keeps normalisation finite when both values of a pair are zero.
pub const NORMALIZE_EPSILON: f64 = 1e-6;

/// Relative change in percent.
///
/// The denominator is offset by one so zero counters do not divide by zero;
/// small previous values are skewed accordingly.
pub fn percent_delta(previous: f64, current: f64) -> f64 {
    (current - previous) * 100.0 / (previous + 1.0)
}

/// Scales a pair around its mutual mean so both land near 1.0.
pub fn normalize_pair(previous: f64, current: f64) -> (f64, f64) {
    let mid = (previous + current) / 2.0;
    (
        previous / (mid + NORMALIZE_EPSILON),
        current / (mid + NORMALIZE_EPSILON),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPair {
    pub field: StatField,
    pub previous: f64,
    pub current: f64,
}

impl FieldPair {
    pub fn delta(&self) -> f64 {
        percent_delta(self.previous, self.current)
    }

    pub fn normalized(&self) -> (f64, f64) {
        normalize_pair(self.previous, self.current)
    }
}

/// Field-by-field pairing of a previous and a current snapshot, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pairs: Vec<FieldPair>,
}

impl Comparison {
    pub fn new(previous: &StatSnapshot, current: &StatSnapshot) -> Self {
        let pairs = StatField::ALL
            .iter()
            .map(|&field| FieldPair {
                field,
                previous: previous.get(field),
                current: current.get(field),
            })
            .collect();
        Self { pairs }
    }

    /// Parses both sides; either side failing to parse is a malformed report.
    pub fn from_json(previous: &str, current: &str) -> Result<Self> {
        Ok(Self::new(
            &StatSnapshot::from_json(previous)?,
            &StatSnapshot::from_json(current)?,
        ))
    }

    pub fn pairs(&self) -> &[FieldPair] {
        &self.pairs
    }

    pub fn pair(&self, field: StatField) -> FieldPair {
        self.pairs
            .iter()
            .copied()
            .find(|p| p.field == field)
            .unwrap_or(FieldPair {
                field,
                previous: 0.0,
                current: 0.0,
            })
    }

    /// Normalised previous and current series, ready for side-by-side charting.
    pub fn normalized(&self) -> (Vec<f64>, Vec<f64>) {
        self.pairs.iter().map(FieldPair::normalized).unzip()
    }
}

/// A way of presenting a [`Comparison`].
pub trait ReportRenderer {
    fn name(&self) -> &'static str;

    fn render(&self, comparison: &Comparison) -> String;
}
