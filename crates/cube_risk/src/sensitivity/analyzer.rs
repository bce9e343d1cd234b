//! Tornado sweeps over the sensitivity variables of a source registry.
//!
//! Every sweep is a full source and metric recompute with a single output
//! percentile (the base). Percentile sources are pinned to the base through
//! per-source percentile overrides; the variable under test is then pinned
//! to the lower and the upper percentile in turn.

use super::tornado::{ExcludedVariable, PercentileTriple, TornadoEntry, TornadoResult, TornadoSort};
use cube_core::types::Percentile;
use cube_engine::lookup::SourceLookup;
use cube_engine::metric::{compute_metrics_data_with_report, MetricRegistry, PercentileInfo};
use cube_engine::scenario::ScenarioStore;
use cube_engine::source::{
    compute_source_data, ComputedSourceRecord, CustomPercentiles, SourceItem, SourceRegistry,
    SourceType,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Error types for sensitivity analysis.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensitivityError {
    /// Percentiles not in `lower < base < upper` order.
    #[error("Invalid percentile triple {0}: expected lower < base < upper")]
    InvalidTriple(PercentileTriple),

    /// Target metric not present in the registry.
    #[error("Unknown target metric: {0}")]
    UnknownMetric(String),

    /// Target metric could not be computed with every variable at base.
    #[error("Target metric '{metric}' unavailable at base: {reason}")]
    BaseUnavailable {
        /// Target metric id
        metric: String,
        /// Failure description
        reason: String,
    },
}

struct Evaluation {
    sources: Vec<ComputedSourceRecord>,
    value: Result<f64, String>,
}

/// Runs tornado analyses against fixed registries and a scenario.
pub struct SensitivityAnalyzer<'a> {
    sources: &'a SourceRegistry,
    metrics: &'a MetricRegistry,
    store: &'a dyn ScenarioStore,
    sort: TornadoSort,
}

impl<'a> SensitivityAnalyzer<'a> {
    /// Create an analyzer ranking by impact.
    pub fn new(sources: &'a SourceRegistry, metrics: &'a MetricRegistry, store: &'a dyn ScenarioStore) -> Self {
        Self {
            sources,
            metrics,
            store,
            sort: TornadoSort::default(),
        }
    }

    /// Set the ranking.
    pub fn with_sort(mut self, sort: TornadoSort) -> Self {
        self.sort = sort;
        self
    }

    /// Sources flagged as sensitivity variables, in processing order.
    pub fn variables(&self) -> Vec<&'a SourceItem> {
        self.sources
            .processing_order()
            .into_iter()
            .filter(|item| item.metadata.sensitivity)
            .collect()
    }

    /// Measure the swing of `target_metric` for every sensitivity variable.
    ///
    /// Variables without percentile data (including flagged sources whose
    /// data is a plain series), without data at one of the triple's
    /// percentiles, or for which the target fails are excluded
    /// and listed in [`TornadoResult::excluded`].
    ///
    /// # Errors
    ///
    /// Fails when the triple is not ordered, the metric is unknown, or the
    /// target cannot be computed with every variable at base.
    pub fn analyze(
        &self,
        target_metric: &str,
        percentiles: PercentileTriple,
    ) -> Result<TornadoResult, SensitivityError> {
        let start = Instant::now();

        if !percentiles.is_ordered() {
            return Err(SensitivityError::InvalidTriple(percentiles));
        }
        if self.metrics.get(target_metric).is_none() {
            return Err(SensitivityError::UnknownMetric(target_metric.to_string()));
        }

        let held: CustomPercentiles = self
            .sources
            .items
            .iter()
            .filter(|item| item.has_percentiles && item.kind() != SourceType::Virtual)
            .map(|item| (item.id.clone(), percentiles.base))
            .collect();

        let base = self.evaluate(target_metric, percentiles.base, &held);
        let base_value = base
            .value
            .map_err(|reason| SensitivityError::BaseUnavailable {
                metric: target_metric.to_string(),
                reason,
            })?;

        let mut entries = Vec::new();
        let mut excluded = Vec::new();
        for item in self.variables() {
            match self.sweep(item, target_metric, percentiles, &held, &base.sources) {
                Ok((low, high)) => {
                    debug!(variable = %item.id, low, high, "sensitivity variable evaluated");
                    entries.push(
                        TornadoEntry::new(&item.id, low, base_value, high)
                            .with_name(item.metadata.name.clone()),
                    );
                }
                Err(reason) => {
                    warn!(variable = %item.id, %reason, "sensitivity variable excluded");
                    excluded.push(ExcludedVariable {
                        variable: item.id.clone(),
                        reason,
                    });
                }
            }
        }

        let mut result = TornadoResult {
            target_metric: target_metric.to_string(),
            percentiles,
            base_value,
            entries,
            excluded,
            computation_time_ns: start.elapsed().as_nanos() as u64,
        };
        result.sort_by(self.sort);

        info!(
            metric = target_metric,
            percentiles = %percentiles,
            evaluated = result.entries.len(),
            excluded = result.excluded.len(),
            "tornado analysis complete"
        );
        Ok(result)
    }

    /// Target values with `item` at the lower and the upper percentile.
    fn sweep(
        &self,
        item: &SourceItem,
        target: &str,
        percentiles: PercentileTriple,
        held: &CustomPercentiles,
        base_sources: &[ComputedSourceRecord],
    ) -> Result<(f64, f64), String> {
        if !item.has_percentiles {
            return Err("no percentile data".to_string());
        }
        if let Some(issue) = variable_issue(base_sources, &item.id, percentiles.base, percentiles.base) {
            return Err(issue);
        }
        if base_sources.iter().any(|r| r.id == item.id && r.is_replicated()) {
            return Err("no percentile data".to_string());
        }

        let mut values = [0.0; 2];
        for (slot, percentile) in values.iter_mut().zip([percentiles.lower, percentiles.upper]) {
            let mut custom = held.clone();
            custom.insert(item.id.clone(), percentile);

            let evaluation = self.evaluate(target, percentiles.base, &custom);
            if let Some(issue) = variable_issue(&evaluation.sources, &item.id, percentiles.base, percentile) {
                return Err(issue);
            }
            *slot = evaluation
                .value
                .map_err(|reason| format!("target failed at P{percentile}: {reason}"))?;
        }
        Ok((values[0], values[1]))
    }

    fn evaluate(&self, target: &str, base: Percentile, custom: &CustomPercentiles) -> Evaluation {
        let sources = compute_source_data(self.sources, &[base], self.store, Some(custom));
        let lookup = SourceLookup::new(&sources);
        let (metrics, report) = compute_metrics_data_with_report(
            self.metrics,
            &PercentileInfo::new(vec![base]),
            self.store,
            &lookup,
        );

        let value = match metrics.iter().find(|m| m.id == target) {
            Some(record) => record
                .value_at(base)
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{target}' is not numeric")),
            None => Err(report
                .errors
                .iter()
                .find(|(id, _)| id == target)
                .map(|(_, error)| error.to_string())
                .unwrap_or_else(|| format!("'{target}' produced no record"))),
        };
        Evaluation { sources, value }
    }
}

/// Why the variable's record cannot stand for percentile `read`.
fn variable_issue(
    sources: &[ComputedSourceRecord],
    id: &str,
    output: Percentile,
    read: Percentile,
) -> Option<String> {
    match sources.iter().find(|r| r.id == id) {
        None => Some(format!("source failed at P{read}")),
        Some(record) if record.is_filled(output) => Some(format!("no data at P{read}")),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cube_engine::metric::{Aggregation, AggregationOp, MetricItem};
    use cube_engine::scenario::JsonScenario;
    use cube_engine::source::SourceMetadata;
    use serde_json::json;

    fn column(value: f64) -> serde_json::Value {
        json!([{ "year": 1, "value": value }, { "year": 2, "value": value }])
    }

    fn scenario() -> JsonScenario {
        JsonScenario::new(json!({
            "volume": { "10": column(8.0), "50": column(10.0), "90": column(12.0) },
            "price": { "10": column(4.0), "50": column(5.0), "90": column(7.0) },
            "sparse": { "50": column(1.0) },
            "fixed": column(3.0)
        }))
    }

    fn variable(id: &str, priority: i32, path: &str) -> SourceItem {
        SourceItem::direct(id, priority, &[path])
            .with_percentiles()
            .with_metadata(SourceMetadata::new(SourceType::Direct).sensitivity_variable())
    }

    fn registries() -> (SourceRegistry, MetricRegistry) {
        let sources = SourceRegistry::new()
            .with_item(variable("volume", 1, "volume"))
            .with_item(variable("price", 2, "price"))
            .with_item(variable("sparse", 3, "sparse"))
            .with_item(
                SourceItem::direct("fixed", 4, &["fixed"])
                    .with_metadata(SourceMetadata::new(SourceType::Direct).sensitivity_variable()),
            )
            .with_item(SourceItem::virtual_source("revenue", 1, |_, ctx| {
                let p = ctx.available_percentiles[0];
                let volume = ctx.processed_series("volume", p).unwrap_or_default();
                let price = ctx.processed_series("price", p).unwrap_or_default();
                Ok(cube_engine::source::SourceOutput::Series(
                    volume
                        .iter()
                        .zip(&price)
                        .map(|(v, pr)| cube_core::types::TimePoint::new(v.year, v.value * pr.value))
                        .collect(),
                ))
            }));
        let metrics = MetricRegistry::new().with_item(
            MetricItem::direct("totalRevenue", 1)
                .with_aggregation(Aggregation::new("revenue", AggregationOp::Sum, "sum").as_default()),
        );
        (sources, metrics)
    }

    #[test]
    fn test_tornado_entries_and_exclusions() {
        let (sources, metrics) = registries();
        let store = scenario();
        let tornado = SensitivityAnalyzer::new(&sources, &metrics, &store)
            .analyze("totalRevenue", PercentileTriple::default())
            .unwrap();

        assert_relative_eq!(tornado.base_value, 100.0);

        // price: 10 * 4 * 2 = 80 .. 10 * 7 * 2 = 140; volume: 80 .. 120.
        let ids: Vec<&str> = tornado.entries.iter().map(|e| e.variable.as_str()).collect();
        assert_eq!(ids, vec!["price", "volume"]);
        let price = tornado.entry("price").unwrap();
        assert_relative_eq!(price.low_value, 80.0);
        assert_relative_eq!(price.high_value, 140.0);
        assert_relative_eq!(price.impact, 60.0);

        let excluded: Vec<(&str, &str)> = tornado
            .excluded
            .iter()
            .map(|e| (e.variable.as_str(), e.reason.as_str()))
            .collect();
        assert_eq!(excluded, vec![("sparse", "no data at P10"), ("fixed", "no percentile data")]);
    }

    #[test]
    fn test_flagged_variable_reading_plain_series_is_excluded() {
        let (sources, metrics) = registries();
        let sources = sources.with_item(variable("plainVolume", 5, "fixed"));
        let store = scenario();
        let tornado = SensitivityAnalyzer::new(&sources, &metrics, &store)
            .analyze("totalRevenue", PercentileTriple::default())
            .unwrap();

        assert!(tornado.entry("plainVolume").is_none());
        assert!(tornado
            .excluded
            .iter()
            .any(|e| e.variable == "plainVolume" && e.reason == "no percentile data"));
        assert_eq!(tornado.entries.len(), 2);
    }

    #[test]
    fn test_invalid_requests() {
        let (sources, metrics) = registries();
        let store = scenario();
        let analyzer = SensitivityAnalyzer::new(&sources, &metrics, &store);

        assert_eq!(
            analyzer.analyze("totalRevenue", PercentileTriple::new(90, 50, 10)),
            Err(SensitivityError::InvalidTriple(PercentileTriple::new(90, 50, 10)))
        );
        assert_eq!(
            analyzer.analyze("nope", PercentileTriple::default()),
            Err(SensitivityError::UnknownMetric("nope".into()))
        );
    }

    #[test]
    fn test_variables_in_processing_order() {
        let (sources, metrics) = registries();
        let store = scenario();
        let analyzer = SensitivityAnalyzer::new(&sources, &metrics, &store);
        let ids: Vec<&str> = analyzer.variables().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["volume", "price", "sparse", "fixed"]);
    }
}
