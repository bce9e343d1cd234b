//! Tornado result types.

use cube_core::types::Percentile;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Percentiles a sensitivity run compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PercentileTriple {
    /// Percentile for the low case
    pub lower: Percentile,
    /// Percentile every other variable is held at
    pub base: Percentile,
    /// Percentile for the high case
    pub upper: Percentile,
}

impl PercentileTriple {
    /// Create a triple.
    pub fn new(lower: Percentile, base: Percentile, upper: Percentile) -> Self {
        Self { lower, base, upper }
    }

    /// Whether `lower < base < upper`.
    pub fn is_ordered(&self) -> bool {
        self.lower < self.base && self.base < self.upper
    }
}

impl Default for PercentileTriple {
    fn default() -> Self {
        Self::new(10, 50, 90)
    }
}

impl fmt::Display for PercentileTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}/P{}/P{}", self.lower, self.base, self.upper)
    }
}

/// Ranking applied to tornado entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TornadoSort {
    /// `|high - low|`, largest first
    #[default]
    Impact,
    /// Combined deviation from base relative to base, largest first
    PercentSpread,
}

impl FromStr for TornadoSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impact" => Ok(Self::Impact),
            "percent-spread" | "spread" => Ok(Self::PercentSpread),
            other => Err(format!("unknown tornado sort '{other}'")),
        }
    }
}

/// Swing of the target metric for one variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TornadoEntry {
    /// Source id of the variable
    pub variable: String,
    /// Display name, if the source has one
    pub name: Option<String>,
    /// Target value with the variable at the lower percentile
    pub low_value: f64,
    /// Target value with every variable at base
    pub base_value: f64,
    /// Target value with the variable at the upper percentile
    pub high_value: f64,
    /// `|high - low|`
    pub impact: f64,
    /// `(|high - base| + |base - low|) / |base|` in percent; 0 when base is 0
    pub percent_spread: f64,
}

impl TornadoEntry {
    /// Build an entry from the three target values.
    pub fn new(variable: impl Into<String>, low_value: f64, base_value: f64, high_value: f64) -> Self {
        let percent_spread = if base_value != 0.0 {
            ((high_value - base_value).abs() + (base_value - low_value).abs()) / base_value.abs() * 100.0
        } else {
            0.0
        };
        Self {
            variable: variable.into(),
            name: None,
            low_value,
            base_value,
            high_value,
            impact: (high_value - low_value).abs(),
            percent_spread,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Lower and upper target values, in ascending order.
    pub fn range(&self) -> (f64, f64) {
        if self.low_value <= self.high_value {
            (self.low_value, self.high_value)
        } else {
            (self.high_value, self.low_value)
        }
    }
}

/// A variable left out of the tornado.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ExcludedVariable {
    /// Source id of the variable
    pub variable: String,
    /// Why it was left out
    pub reason: String,
}

/// Result of a tornado analysis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TornadoResult {
    /// Metric the swings are measured on
    pub target_metric: String,
    /// Percentiles used
    pub percentiles: PercentileTriple,
    /// Target value with every variable at base
    pub base_value: f64,
    /// Entries in ranking order
    pub entries: Vec<TornadoEntry>,
    /// Variables that could not be evaluated
    pub excluded: Vec<ExcludedVariable>,
    /// Wall-clock time of the analysis in nanoseconds
    pub computation_time_ns: u64,
}

impl TornadoResult {
    /// Re-rank the entries.
    ///
    /// Ties keep ascending variable id order.
    pub fn sort_by(&mut self, sort: TornadoSort) {
        let key = |entry: &TornadoEntry| match sort {
            TornadoSort::Impact => entry.impact,
            TornadoSort::PercentSpread => entry.percent_spread,
        };
        self.entries.sort_by(|a, b| {
            key(b)
                .total_cmp(&key(a))
                .then_with(|| a.variable.cmp(&b.variable))
        });
    }

    /// Entry for `variable`.
    pub fn entry(&self, variable: &str) -> Option<&TornadoEntry> {
        self.entries.iter().find(|e| e.variable == variable)
    }

    /// Largest swing, if any variable was evaluated.
    pub fn max_impact(&self) -> Option<f64> {
        self.entries
            .iter()
            .map(|e| e.impact)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }
}
