//! `compute_source_data`: sequential evaluation of a source registry.

use super::multiplier::{apply_multiplier, resolve_lookup};
use super::normalize::{normalize_output, parse_json};
use super::record::{ComputedSourceRecord, SourceAudit};
use super::registry::{
    CustomPercentiles, ProcessedSources, SourceContext, SourceItem, SourceOutput, SourceRegistry,
};
use crate::analysis::analyze_source_registry;
use crate::reference::{load_references, merge_references, ReferenceSet};
use crate::scenario::ScenarioStore;
use cube_core::audit::{AuditKind, AuditOperation, AuditTrail};
use cube_core::types::{CubeError, Percentile};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Counters for one source run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRunReport {
    /// Items that produced a record
    pub processed: usize,
    /// Items rejected for their shape
    pub config_errors: usize,
    /// Items that failed while processing
    pub failures: usize,
    /// References that failed to load
    pub reference_errors: usize,
    /// Error per skipped item, in processing order
    pub errors: Vec<(String, CubeError)>,
}

impl SourceRunReport {
    /// Whether every item produced a record.
    pub fn is_clean(&self) -> bool {
        self.config_errors == 0 && self.failures == 0
    }

    fn skip(&mut self, id: &str, error: CubeError) {
        warn!(id, error = %error, "source skipped");
        if error.is_configuration() {
            self.config_errors += 1;
        } else {
            self.failures += 1;
        }
        self.errors.push((id.to_string(), error));
    }
}

/// Evaluate every item of `registry`.
///
/// Items run in `(type, priority)` order; a failing item is logged and
/// left out of the output without affecting the others.
pub fn compute_source_data(
    registry: &SourceRegistry,
    available_percentiles: &[Percentile],
    store: &dyn ScenarioStore,
    custom_percentiles: Option<&CustomPercentiles>,
) -> Vec<ComputedSourceRecord> {
    compute_source_data_with_report(registry, available_percentiles, store, custom_percentiles).0
}

/// [`compute_source_data`] returning the run counters as well.
pub fn compute_source_data_with_report(
    registry: &SourceRegistry,
    available_percentiles: &[Percentile],
    store: &dyn ScenarioStore,
    custom_percentiles: Option<&CustomPercentiles>,
) -> (Vec<ComputedSourceRecord>, SourceRunReport) {
    let mut report = SourceRunReport::default();

    let global = load_references(&registry.references, store);
    report.reference_errors += global.failures.len();

    let mut rejected: BTreeMap<usize, CubeError> = analyze_source_registry(registry)
        .into_iter()
        .map(|issue| (issue.index, issue.error))
        .collect();

    let mut processed = ProcessedSources::new();
    let mut records = Vec::new();

    for index in registry.ordered_indices() {
        let item = &registry.items[index];
        if let Some(error) = rejected.remove(&index) {
            report.skip(&item.id, error);
            continue;
        }

        let local = load_references(&item.references, store);
        report.reference_errors += local.failures.len();
        let references = merge_references(&global.values, local.values);

        let custom_percentile = custom_percentiles.and_then(|c| c.get(&item.id).copied());
        match process_item(
            item,
            available_percentiles,
            store,
            references,
            &processed,
            custom_percentile,
        ) {
            Ok(record) => {
                debug!(
                    id = %record.id,
                    points = record.percentile_source.len(),
                    "source processed"
                );
                report.processed += 1;
                records.push(record.clone());
                processed.insert(record.id.clone(), record);
            }
            Err(error) => report.skip(&item.id, error),
        }
    }

    info!(
        processed = report.processed,
        config_errors = report.config_errors,
        failures = report.failures,
        reference_errors = report.reference_errors,
        "source computation complete"
    );
    (records, report)
}

fn process_item(
    item: &SourceItem,
    available: &[Percentile],
    store: &dyn ScenarioStore,
    references: ReferenceSet,
    processed: &ProcessedSources,
    custom_percentile: Option<Percentile>,
) -> Result<ComputedSourceRecord, CubeError> {
    let mut trail = AuditTrail::new(AuditKind::Source);

    item.validate()?;
    trail.add_entry(
        "validation",
        AuditOperation::Validation,
        format!("{} source shape accepted", item.kind().name()),
        &[],
        None,
    );

    let reference_ids: Vec<&str> = references.keys().map(String::as_str).collect();
    trail.add_entry(
        "references",
        AuditOperation::References,
        format!("{} references visible", references.len()),
        &reference_ids,
        None,
    );

    let raw = match &item.path {
        Some(path) => {
            let value = store.value_by_path(path);
            trail.add_entry(
                "extraction",
                AuditOperation::Extraction,
                format!("read {}", path.join(".")),
                &[],
                value.clone(),
            );
            if value.is_none() && item.transformer.is_none() {
                return Err(CubeError::missing_dependency("path", path.join(".")));
            }
            value
        }
        None => None,
    };

    let output = match &item.transformer {
        Some(transformer) => {
            let context = SourceContext {
                id: &item.id,
                has_percentiles: item.has_percentiles,
                available_percentiles: available,
                references: &references,
                processed,
                custom_percentile,
                metadata: &item.metadata,
            };
            let output = transformer(raw.as_ref(), &context)?;
            let read: Vec<&str> = processed.keys().map(String::as_str).collect();
            trail.add_entry("transform", AuditOperation::Transform, "transformer applied", &read, None);
            output
        }
        None => match raw {
            Some(value) => parse_json(&value)?,
            None => SourceOutput::Series(Vec::new()),
        },
    };

    let normalized = normalize_output(output, available, custom_percentile)?;
    if !normalized.filled.is_empty() {
        debug!(id = %item.id, filled = ?normalized.filled, "percentiles zero-filled");
    }
    let mut results = normalized.results;

    let mut applied_multipliers = Vec::with_capacity(item.multipliers.len());
    for multiplier in &item.multipliers {
        let lookup = resolve_lookup(&multiplier.id, processed, &references)?;
        let applied = apply_multiplier(&mut results, multiplier, &lookup);
        trail.add_entry(
            "multipliers",
            AuditOperation::Multiplier,
            format!(
                "{} by '{}' from {} ({} applied, {} filtered, {} missing)",
                multiplier.operation.name(),
                multiplier.id,
                multiplier.base_year,
                applied.applied,
                applied.filtered,
                applied.missing
            ),
            &[multiplier.id.as_str()],
            None,
        );
        applied_multipliers.push(applied);
    }

    trail.add_entry(
        "assembly",
        AuditOperation::Assembly,
        format!("{} points over {} percentiles", results.len(), available.len()),
        &[],
        serde_json::to_value(&results).ok(),
    );

    if results.iter().any(|r| !r.value.is_finite()) {
        return Err(CubeError::computation(format!(
            "source '{}' produced non-finite values",
            item.id
        )));
    }

    Ok(ComputedSourceRecord {
        id: item.id.clone(),
        has_percentiles: item.has_percentiles,
        percentile_source: results,
        metadata: item.metadata.clone(),
        audit: SourceAudit {
            applied_multipliers,
            trail,
            references,
            filled_percentiles: normalized.filled,
            replicated: normalized.replicated,
        },
    })
}
