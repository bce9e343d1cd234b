//! Computed source records.

use super::registry::{MultiplierOperation, SourceMetadata};
use crate::reference::ReferenceSet;
use cube_core::audit::AuditTrail;
use cube_core::types::{series_at_percentile, Percentile, SimResult, TimePoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bookkeeping for one multiplier applied to a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMultiplier {
    /// Multiplier value source id
    pub id: String,
    /// Operation applied
    pub operation: MultiplierOperation,
    /// Base year
    pub base_year: i32,
    /// Points the operation was applied to
    pub applied: usize,
    /// Points skipped by the filter
    pub filtered: usize,
    /// Points skipped because the lookup had no value
    pub missing: usize,
}

/// Audit section of a source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAudit {
    /// Multipliers in application order
    pub applied_multipliers: Vec<AppliedMultiplier>,
    /// Processing trail
    pub trail: AuditTrail,
    /// References visible to the item (global overlaid with local)
    pub references: ReferenceSet,
    /// Output percentiles that were zero-filled during normalisation
    pub filled_percentiles: Vec<Percentile>,
    /// Whether the data was a plain series copied to every percentile
    #[serde(default)]
    pub replicated: bool,
}

/// Output of one source item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedSourceRecord {
    /// Source id
    pub id: String,
    /// Whether the item declared percentile data
    pub has_percentiles: bool,
    /// One entry per `(year, percentile)`
    pub percentile_source: Vec<SimResult>,
    /// Item metadata
    pub metadata: SourceMetadata,
    /// Audit section
    pub audit: SourceAudit,
}

impl ComputedSourceRecord {
    /// Series at `percentile`, ordered by year.
    pub fn series(&self, percentile: Percentile) -> Vec<TimePoint> {
        series_at_percentile(&self.percentile_source, percentile)
    }

    /// Results at `percentile`.
    pub fn results_at(&self, percentile: Percentile) -> Vec<SimResult> {
        self.percentile_source
            .iter()
            .filter(|r| r.percentile.value == percentile)
            .copied()
            .collect()
    }

    /// Value at `(year, percentile)`.
    pub fn value_at(&self, year: i32, percentile: Percentile) -> Option<f64> {
        self.percentile_source
            .iter()
            .find(|r| r.year == year && r.percentile.value == percentile)
            .map(|r| r.value)
    }

    /// Distinct percentiles present, ascending.
    pub fn percentiles(&self) -> Vec<Percentile> {
        self.percentile_source
            .iter()
            .map(|r| r.percentile.value)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct years present, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.percentile_source
            .iter()
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether `percentile` was zero-filled rather than read.
    pub fn is_filled(&self, percentile: Percentile) -> bool {
        self.audit.filled_percentiles.contains(&percentile)
    }

    /// Whether every percentile carries the same copied series.
    pub fn is_replicated(&self) -> bool {
        self.audit.replicated
    }
}
