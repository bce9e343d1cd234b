//! `compute_metrics_data`: sequential evaluation of a metric registry.

use super::aggregation::{aggregate, filter_series, ResolvedParameters};
use super::normalize::{normalize_metric_output, NormalizedMetrics};
use super::record::{ComputedMetricRecord, MetricAudit, ValueType};
use super::registry::{
    AggregationOp, AggregationResults, DependencyKind, MetricContext, MetricItem, MetricRegistry,
    ProcessedMetrics, ResolvedDependencies, DISCOUNT_RATE,
};
use crate::analysis::analyze_metric_registry;
use crate::lookup::{SourceDataProvider, SourceDataView, SourceFilter};
use crate::reference::{load_references, reference_number, ReferenceSet};
use crate::scenario::ScenarioStore;
use cube_core::audit::{AuditKind, AuditOperation, AuditTrail};
use cube_core::types::{series_at_percentile, CubeError, CubeMetricResult, Percentile};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Percentiles a metric run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentileInfo {
    /// Percentiles every record reports
    pub available: Vec<Percentile>,
    /// When set, aggregations read this percentile of their sources for
    /// every output percentile
    #[serde(default)]
    pub custom: Option<Percentile>,
}

impl PercentileInfo {
    /// Percentile set without an override.
    pub fn new(available: Vec<Percentile>) -> Self {
        Self {
            available,
            custom: None,
        }
    }

    /// Set the percentile override.
    pub fn with_custom(mut self, percentile: Percentile) -> Self {
        self.custom = Some(percentile);
        self
    }
}

/// Counters for one metric run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRunReport {
    /// Metrics that produced a record
    pub processed: usize,
    /// Metrics rejected for their shape or for a cycle
    pub config_errors: usize,
    /// Metrics that failed while processing
    pub failures: usize,
    /// References that failed to load
    pub reference_errors: usize,
    /// Aggregations that read missing data and reported zero
    pub missing_data: usize,
    /// Error per skipped metric, in processing order
    pub errors: Vec<(String, CubeError)>,
}

impl MetricRunReport {
    /// Whether every metric produced a record.
    pub fn is_clean(&self) -> bool {
        self.config_errors == 0 && self.failures == 0
    }

    fn skip(&mut self, id: &str, error: CubeError) {
        warn!(id, error = %error, "metric skipped");
        if error.is_configuration() {
            self.config_errors += 1;
        } else {
            self.failures += 1;
        }
        self.errors.push((id.to_string(), error));
    }
}

/// Evaluate every metric of `registry`.
///
/// Sources are read through `provider`; earlier metrics are read from the
/// records produced so far in this call. A metric whose dependency failed
/// fails in turn and is skipped.
pub fn compute_metrics_data(
    registry: &MetricRegistry,
    percentile_info: &PercentileInfo,
    store: &dyn ScenarioStore,
    provider: &dyn SourceDataProvider,
) -> Vec<ComputedMetricRecord> {
    compute_metrics_data_with_report(registry, percentile_info, store, provider).0
}

/// [`compute_metrics_data`] returning the run counters as well.
pub fn compute_metrics_data_with_report(
    registry: &MetricRegistry,
    percentile_info: &PercentileInfo,
    store: &dyn ScenarioStore,
    provider: &dyn SourceDataProvider,
) -> (Vec<ComputedMetricRecord>, MetricRunReport) {
    let mut report = MetricRunReport::default();

    let global = load_references(&registry.references, store);
    report.reference_errors += global.failures.len();

    let mut rejected: BTreeMap<usize, CubeError> = analyze_metric_registry(registry)
        .into_iter()
        .map(|issue| (issue.index, issue.error))
        .collect();

    let mut processed = ProcessedMetrics::new();
    let mut records = Vec::new();

    for index in registry.ordered_indices() {
        let item = &registry.items[index];
        if let Some(error) = rejected.remove(&index) {
            report.skip(&item.id, error);
            continue;
        }

        let mut evaluation = MetricEvaluation {
            item,
            percentiles: percentile_info,
            store,
            provider,
            global: &global.values,
            processed: &processed,
            trail: AuditTrail::new(AuditKind::Metric),
            reference_errors: 0,
            missing_data: 0,
        };
        let outcome = evaluation.run();
        report.reference_errors += evaluation.reference_errors;
        report.missing_data += evaluation.missing_data;

        match outcome {
            Ok(record) => {
                debug!(id = %record.id, "metric processed");
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
        missing_data = report.missing_data,
        "metric computation complete"
    );
    (records, report)
}

struct MetricEvaluation<'a> {
    item: &'a MetricItem,
    percentiles: &'a PercentileInfo,
    store: &'a dyn ScenarioStore,
    provider: &'a dyn SourceDataProvider,
    global: &'a ReferenceSet,
    processed: &'a ProcessedMetrics,
    trail: AuditTrail,
    reference_errors: usize,
    missing_data: usize,
}

impl MetricEvaluation<'_> {
    fn run(&mut self) -> Result<ComputedMetricRecord, CubeError> {
        let item = self.item;
        item.validate()?;

        let dependencies = self.resolve_dependencies()?;
        let aggregation_results = self.aggregate(&dependencies.references)?;

        let available = self.percentiles.available.as_slice();
        let normalized = match &item.transformer {
            Some(transformer) => {
                let mut context = MetricContext::new(
                    &item.id,
                    available,
                    &aggregation_results,
                    self.percentiles.custom,
                    &mut self.trail,
                );
                let output = transformer(&dependencies, &mut context)?;
                let normalized = normalize_metric_output(output, available);
                self.trail.add_entry(
                    "transform",
                    AuditOperation::Transform,
                    format!("transformer returned {} results", normalized.results.len()),
                    &[],
                    serde_json::to_value(&normalized.results).ok(),
                );
                Some(normalized)
            }
            None => None,
        };

        let (mut results, fallback_percentiles) =
            self.apply_fallback(normalized, &aggregation_results);

        for operation in &item.operations {
            let target = self.operation_target(&operation.id, &dependencies.references)?;
            for result in results.iter_mut() {
                let p = result.percentile.value;
                let target_value = target.get(&p).copied().ok_or_else(|| {
                    CubeError::missing_dependency("operation", format!("{}@{}", operation.id, p))
                })?;
                let value = (operation.operation)(
                    result.value,
                    p,
                    target_value,
                    &dependencies.references,
                    self.processed,
                );
                if !value.is_finite() {
                    return Err(CubeError::computation(format!(
                        "operation '{}' produced a non-numeric value at percentile {}",
                        operation.id, p
                    )));
                }
                result.value = value;
            }
            self.trail.add_entry(
                "operations",
                AuditOperation::Operation,
                format!("applied operation with '{}'", operation.id),
                &[operation.id.as_str()],
                None,
            );
        }

        self.trail.add_entry(
            "assembly",
            AuditOperation::Assembly,
            format!("{} percentile results", results.len()),
            &[],
            Some(json!(results.iter().map(|r| r.value).collect::<Vec<_>>())),
        );

        Ok(ComputedMetricRecord {
            id: item.id.clone(),
            value_type: ValueType::Scalar,
            percentile_metrics: results,
            metadata: item.metadata.clone(),
            audit: MetricAudit {
                trail: std::mem::replace(&mut self.trail, AuditTrail::new(AuditKind::Metric)),
                references: dependencies.references,
                aggregation_results,
                fallback_percentiles,
            },
        })
    }

    fn resolve_dependencies(&mut self) -> Result<ResolvedDependencies, CubeError> {
        let mut resolved = ResolvedDependencies {
            references: self.global.clone(),
            ..ResolvedDependencies::default()
        };

        for dependency in &self.item.dependencies {
            match dependency.kind {
                DependencyKind::Source => {
                    let view = self.provider.source_data(&SourceFilter::by_id(&dependency.id))?;
                    resolved.sources.insert(dependency.id.clone(), view);
                }
                DependencyKind::Metric => {
                    let record = self
                        .processed
                        .get(&dependency.id)
                        .ok_or_else(|| CubeError::missing_dependency("metric", &dependency.id))?;
                    resolved.metrics.insert(dependency.id.clone(), record.clone());
                }
                DependencyKind::Reference => {
                    if self.global.contains_key(&dependency.id) {
                        continue;
                    }
                    let loaded = dependency
                        .path
                        .as_ref()
                        .and_then(|path| self.store.value_by_path(path));
                    match loaded {
                        Some(value) => {
                            resolved.references.insert(dependency.id.clone(), value);
                        }
                        None => {
                            warn!(
                                metric = %self.item.id,
                                reference = %dependency.id,
                                "reference failed to load"
                            );
                            self.reference_errors += 1;
                        }
                    }
                }
            }
        }

        let ids: Vec<&str> = self.item.dependencies.iter().map(|d| d.id.as_str()).collect();
        self.trail.add_entry(
            "dependencies",
            AuditOperation::Dependencies,
            format!(
                "{} sources, {} metrics, {} references",
                resolved.sources.len(),
                resolved.metrics.len(),
                resolved.references.len()
            ),
            &ids,
            None,
        );
        Ok(resolved)
    }

    fn resolve_parameters(&self, references: &ReferenceSet) -> Result<Vec<ResolvedParameters>, CubeError> {
        self.item
            .aggregations
            .iter()
            .map(|aggregation| {
                let mut resolved = ResolvedParameters::new();
                for (name, parameter) in &aggregation.parameters {
                    match parameter.resolve(references, self.processed) {
                        Some(value) => {
                            resolved.insert(name.clone(), value);
                        }
                        None => warn!(
                            metric = %self.item.id,
                            parameter = %name,
                            "parameter could not be resolved"
                        ),
                    }
                }
                if matches!(aggregation.operation, AggregationOp::Npv)
                    && !resolved.contains_key(DISCOUNT_RATE)
                {
                    return Err(CubeError::configuration(
                        &self.item.id,
                        format!("npv over '{}' has no discount rate", aggregation.source_id),
                    ));
                }
                Ok(resolved)
            })
            .collect()
    }

    fn aggregate(&mut self, references: &ReferenceSet) -> Result<AggregationResults, CubeError> {
        let mut results = AggregationResults::new();
        if self.item.aggregations.is_empty() {
            return Ok(results);
        }

        let parameters = self.resolve_parameters(references)?;

        let mut views: BTreeMap<&str, Option<SourceDataView>> = BTreeMap::new();
        for aggregation in &self.item.aggregations {
            let id = aggregation.source_id.as_str();
            if views.contains_key(id) {
                continue;
            }
            let view = match self.provider.source_data(&SourceFilter::by_id(id)) {
                Ok(view) => Some(view),
                Err(error) => {
                    warn!(metric = %self.item.id, source = id, error = %error, "aggregation source unavailable");
                    None
                }
            };
            views.insert(id, view);
        }

        for &percentile in &self.percentiles.available {
            let read_from = self.percentiles.custom.unwrap_or(percentile);
            let stats = results.entry(percentile).or_default();
            for (aggregation, params) in self.item.aggregations.iter().zip(&parameters) {
                let slice = views
                    .get(aggregation.source_id.as_str())
                    .and_then(Option::as_ref)
                    .and_then(|view| view.get(&read_from.to_string()));
                let value = match slice {
                    Some(slice) => {
                        let series = filter_series(
                            aggregation,
                            series_at_percentile(&slice.data, read_from),
                        );
                        aggregate(&aggregation.operation, &series, params)?
                    }
                    None => {
                        warn!(
                            metric = %self.item.id,
                            source = %aggregation.source_id,
                            percentile = read_from,
                            "no data for aggregation, using 0"
                        );
                        self.missing_data += 1;
                        0.0
                    }
                };
                stats.insert(aggregation.output_key.clone(), value);
            }
        }

        let sources: Vec<&str> = views.keys().copied().collect();
        self.trail.add_entry(
            "aggregations",
            AuditOperation::Aggregation,
            format!(
                "{} aggregations over {} percentiles",
                self.item.aggregations.len(),
                self.percentiles.available.len()
            ),
            &sources,
            serde_json::to_value(&results).ok(),
        );
        Ok(results)
    }

    /// Fill values the transformer did not provide.
    ///
    /// Returns the results and the percentiles whose value came from the
    /// default aggregation (or zero when there is none).
    fn apply_fallback(
        &mut self,
        normalized: Option<NormalizedMetrics>,
        aggregation_results: &AggregationResults,
    ) -> (Vec<CubeMetricResult>, Vec<Percentile>) {
        let available = &self.percentiles.available;
        let default_key = self
            .item
            .aggregations
            .iter()
            .rev()
            .find(|a| a.is_default)
            .map(|a| a.output_key.as_str());

        let (mut results, incomplete) = match normalized {
            Some(normalized) => {
                let incomplete = normalized.incomplete_percentiles();
                (normalized.results, incomplete)
            }
            None => (
                available.iter().map(|&p| CubeMetricResult::zero(p)).collect(),
                available.clone(),
            ),
        };

        for result in results.iter_mut() {
            let p = result.percentile.value;
            let stats = aggregation_results.get(&p);
            if incomplete.contains(&p) {
                result.value = default_key
                    .and_then(|key| stats.and_then(|s| s.get(key)).copied())
                    .unwrap_or(0.0);
            }
            if let Some(stats) = stats {
                for (key, value) in stats {
                    result.stats.entry(key.clone()).or_insert(*value);
                }
            }
        }

        if !incomplete.is_empty() {
            let source = match default_key {
                Some(key) => format!("default aggregation '{key}'"),
                None => "zero".to_string(),
            };
            self.trail.add_entry(
                "fallback",
                AuditOperation::Fallback,
                format!("{} percentiles filled from {}", incomplete.len(), source),
                &[],
                None,
            );
        }
        (results, incomplete)
    }

    /// Target values of an operation per percentile.
    ///
    /// References are checked before metrics.
    fn operation_target(
        &self,
        id: &str,
        references: &ReferenceSet,
    ) -> Result<BTreeMap<Percentile, f64>, CubeError> {
        if let Some(value) = reference_number(references, id) {
            return Ok(self
                .percentiles
                .available
                .iter()
                .map(|&p| (p, value))
                .collect());
        }
        let record = self
            .processed
            .get(id)
            .ok_or_else(|| CubeError::missing_dependency("operation", id))?;
        Ok(record
            .percentile_metrics
            .iter()
            .map(|r| (r.percentile.value, r.value))
            .collect())
    }
}
