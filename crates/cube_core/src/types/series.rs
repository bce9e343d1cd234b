//! Percentile-indexed time-series types.
//!
//! [`SimResult`] is the fundamental unit of the pipeline: one `(year, value)`
//! observation tagged with the Monte-Carlo percentile it belongs to. A source
//! record holds one `SimResult` per `(year, percentile)` pair; a metric record
//! holds one [`CubeMetricResult`] per percentile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Monte-Carlo percentile (e.g. 10, 50, 90).
pub type Percentile = u32;

/// Percentile tag carried by every result.
///
/// Serialises as `{"value": 50}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PercentileRef {
    /// Percentile value
    pub value: Percentile,
}

impl PercentileRef {
    /// Create a percentile tag.
    pub fn new(value: Percentile) -> Self {
        Self { value }
    }
}

impl From<Percentile> for PercentileRef {
    fn from(value: Percentile) -> Self {
        Self { value }
    }
}

/// A single `(year, value)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    /// Project year (year 0 is typically construction)
    pub year: i32,
    /// Observed value
    pub value: f64,
}

impl TimePoint {
    /// Create a new time point.
    pub fn new(year: i32, value: f64) -> Self {
        Self { year, value }
    }
}

/// A `(year, value)` observation at a given percentile.
///
/// # Examples
///
/// ```
/// use cube_core::types::SimResult;
///
/// let point = SimResult::new(3, 104.04, 50);
/// assert_eq!(point.percentile.value, 50);
/// assert_eq!(point.time_point().year, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimResult {
    /// Project year
    pub year: i32,
    /// Value at this year and percentile
    pub value: f64,
    /// Percentile this observation belongs to
    pub percentile: PercentileRef,
}

impl SimResult {
    /// Create a new result.
    pub fn new(year: i32, value: f64, percentile: Percentile) -> Self {
        Self {
            year,
            value,
            percentile: PercentileRef::new(percentile),
        }
    }

    /// Drop the percentile tag.
    pub fn time_point(&self) -> TimePoint {
        TimePoint::new(self.year, self.value)
    }
}

/// Extract the time series of one percentile, ordered by year.
pub fn series_at_percentile(results: &[SimResult], percentile: Percentile) -> Vec<TimePoint> {
    let mut series: Vec<TimePoint> = results
        .iter()
        .filter(|r| r.percentile.value == percentile)
        .map(SimResult::time_point)
        .collect();
    series.sort_by_key(|p| p.year);
    series
}

/// Scalar metric value at one percentile.
///
/// `stats` carries the named aggregation outputs for that percentile.
/// `raw` holds a transformer payload that could not be read as a number;
/// such results report a NaN `value` until the default-value fallback
/// replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeMetricResult {
    /// Percentile this value belongs to
    pub percentile: PercentileRef,
    /// Metric value
    pub value: f64,
    /// Named statistics (aggregation outputs)
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    /// Verbatim non-numeric transformer payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl CubeMetricResult {
    /// Create a result with empty stats.
    pub fn new(percentile: Percentile, value: f64) -> Self {
        Self {
            percentile: PercentileRef::new(percentile),
            value,
            stats: BTreeMap::new(),
            raw: None,
        }
    }

    /// Zero-valued placeholder.
    pub fn zero(percentile: Percentile) -> Self {
        Self::new(percentile, 0.0)
    }

    /// Attach statistics.
    pub fn with_stats(mut self, stats: BTreeMap<String, f64>) -> Self {
        self.stats = stats;
        self
    }

    /// Whether `value` is a finite number.
    pub fn is_numeric(&self) -> bool {
        self.value.is_finite()
    }
}
