//! Computed metric records.

use super::registry::{AggregationResults, MetricMetadata};
use crate::reference::ReferenceSet;
use cube_core::audit::AuditTrail;
use cube_core::types::{CubeMetricResult, Percentile};
use serde::{Deserialize, Serialize};

/// Value shape of a metric record. Only scalars are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// One number per percentile
    #[default]
    Scalar,
}

/// Audit section of a metric record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAudit {
    /// Processing trail
    pub trail: AuditTrail,
    /// References visible to the metric
    pub references: ReferenceSet,
    /// Aggregation outputs per percentile
    pub aggregation_results: AggregationResults,
    /// Percentiles whose value came from the default-value fallback
    pub fallback_percentiles: Vec<Percentile>,
}

/// Output of one metric item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedMetricRecord {
    /// Metric id
    pub id: String,
    /// Value shape
    pub value_type: ValueType,
    /// One result per available percentile
    pub percentile_metrics: Vec<CubeMetricResult>,
    /// Item metadata
    pub metadata: MetricMetadata,
    /// Audit section
    pub audit: MetricAudit,
}

impl ComputedMetricRecord {
    /// Result at `percentile`.
    pub fn result_at(&self, percentile: Percentile) -> Option<&CubeMetricResult> {
        self.percentile_metrics
            .iter()
            .find(|r| r.percentile.value == percentile)
    }

    /// Value at `percentile`.
    pub fn value_at(&self, percentile: Percentile) -> Option<f64> {
        self.result_at(percentile).map(|r| r.value)
    }

    /// Named statistic at `percentile`.
    pub fn stat_at(&self, percentile: Percentile, key: &str) -> Option<f64> {
        self.result_at(percentile)?.stats.get(key).copied()
    }
}
