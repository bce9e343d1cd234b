//! Per-item audit trail.
//!
//! Every source and metric carries an [`AuditTrail`] recording the
//! processing steps it went through, the dependencies it touched and
//! optional data samples. Entries sharing a step name are grouped by
//! [`AuditTrail::step_summaries`], whose `duration_ms` is the timestamp
//! delta between the first and last entry of the step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// What kind of item owns the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    /// Source registry item
    Source,
    /// Metric registry item
    Metric,
}

/// Processing operation an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Shape/type validation
    Validation,
    /// Reference resolution
    References,
    /// Dependency resolution
    Dependencies,
    /// Data extraction from the scenario document
    Extraction,
    /// Transformer call
    Transform,
    /// Multiplier application
    Multiplier,
    /// Aggregation over time series
    Aggregation,
    /// Default-value fallback
    Fallback,
    /// Post-hoc metric operation
    Operation,
    /// Record assembly
    Assembly,
    /// Entry added by a custom transformer
    Custom,
}

/// A single audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Step name used for grouping
    pub step: String,
    /// Human-readable description
    pub details: String,
    /// Identifiers touched by this step
    pub dependencies: Vec<String>,
    /// Kind of item owning the trail
    #[serde(rename = "type")]
    pub entry_type: AuditKind,
    /// Operation category
    pub type_operation: AuditOperation,
    /// Optional (truncated) data sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_sample: Option<Value>,
}

/// Entries of one step, grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Step name
    pub step: String,
    /// Number of entries recorded under the step
    pub entry_count: usize,
    /// Milliseconds between the first and last entry of the step
    pub duration_ms: i64,
    /// Union of dependencies touched by the step, sorted
    pub dependencies: Vec<String>,
}

/// Ordered log of processing steps for one registry item.
///
/// # Examples
///
/// ```
/// use cube_core::audit::{AuditKind, AuditOperation, AuditTrail};
///
/// let mut trail = AuditTrail::new(AuditKind::Source);
/// trail.add_entry("extract", AuditOperation::Extraction, "read path", &["capex"], None);
/// trail.add_entry("extract", AuditOperation::Extraction, "normalised", &[], None);
///
/// let summaries = trail.step_summaries();
/// assert_eq!(summaries.len(), 1);
/// assert_eq!(summaries[0].entry_count, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    kind: AuditKind,
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    /// Maximum number of array elements kept in a data sample.
    pub const SAMPLE_LIMIT: usize = 5;

    /// Create an empty trail.
    pub fn new(kind: AuditKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Kind of item owning this trail.
    pub fn kind(&self) -> AuditKind {
        self.kind
    }

    /// Record an entry stamped with the current time.
    pub fn add_entry(
        &mut self,
        step: impl Into<String>,
        operation: AuditOperation,
        details: impl Into<String>,
        dependencies: &[&str],
        data_sample: Option<Value>,
    ) {
        self.record_at(Utc::now(), step, operation, details, dependencies, data_sample);
    }

    /// Record an entry with an explicit timestamp.
    pub fn record_at(
        &mut self,
        timestamp: DateTime<Utc>,
        step: impl Into<String>,
        operation: AuditOperation,
        details: impl Into<String>,
        dependencies: &[&str],
        data_sample: Option<Value>,
    ) {
        self.entries.push(AuditEntry {
            timestamp,
            step: step.into(),
            details: details.into(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            entry_type: self.kind,
            type_operation: operation,
            data_sample: data_sample.map(truncate_sample),
        });
    }

    /// All entries in recording order.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every dependency touched by any step, de-duplicated and sorted.
    pub fn dependencies(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.dependencies.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Group entries by step name in first-appearance order.
    pub fn step_summaries(&self) -> Vec<StepSummary> {
        let mut order: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !order.contains(&entry.step.as_str()) {
                order.push(&entry.step);
            }
        }

        order
            .into_iter()
            .map(|step| {
                let grouped: Vec<&AuditEntry> =
                    self.entries.iter().filter(|e| e.step == step).collect();
                let first = grouped.first().map(|e| e.timestamp);
                let last = grouped.last().map(|e| e.timestamp);
                let duration_ms = match (first, last) {
                    (Some(first), Some(last)) => (last - first).num_milliseconds(),
                    _ => 0,
                };
                let dependencies = grouped
                    .iter()
                    .flat_map(|e| e.dependencies.iter().cloned())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                StepSummary {
                    step: step.to_string(),
                    entry_count: grouped.len(),
                    duration_ms,
                    dependencies,
                }
            })
            .collect()
    }
}

fn truncate_sample(sample: Value) -> Value {
    match sample {
        Value::Array(items) if items.len() > AuditTrail::SAMPLE_LIMIT => {
            Value::Array(items.into_iter().take(AuditTrail::SAMPLE_LIMIT).collect())
        }
        other => other,
    }
}
