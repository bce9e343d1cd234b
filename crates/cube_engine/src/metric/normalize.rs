//! Normalisation of metric transformer output.

use super::registry::MetricOutput;
use cube_core::types::{CubeMetricResult, Percentile, PercentileRef};
use serde_json::Value;
use std::collections::BTreeMap;

/// Transformer output expanded to one result per available percentile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedMetrics {
    /// One result per available percentile, in available order
    pub results: Vec<CubeMetricResult>,
    /// Percentiles the output did not cover, filled with zero placeholders
    pub placeholders: Vec<Percentile>,
}

impl NormalizedMetrics {
    /// Percentiles that need the default-value fallback: placeholders and
    /// non-numeric values.
    pub fn incomplete_percentiles(&self) -> Vec<Percentile> {
        self.results
            .iter()
            .filter(|r| !r.is_numeric() || self.placeholders.contains(&r.percentile.value))
            .map(|r| r.percentile.value)
            .collect()
    }
}

/// Expand a transformer output over `available`.
///
/// - `Results` entries are matched by percentile; missing percentiles get a
///   zero placeholder and entries outside `available` are dropped.
/// - `Single` is replicated, keeping its value, stats and raw payload.
/// - `Scalar` is replicated with empty stats.
/// - `Json` numbers, numeric strings and booleans (`0`/`1`) become scalars,
///   `null` becomes `0`, a string that is not a number becomes NaN; arrays
///   and objects shaped like results are read as such and anything else is
///   kept verbatim in `raw` with a NaN value.
pub fn normalize_metric_output(output: MetricOutput, available: &[Percentile]) -> NormalizedMetrics {
    match output {
        MetricOutput::Results(results) => match_percentiles(results, available),
        MetricOutput::Single(result) => replicate(&result, available),
        MetricOutput::Scalar(value) => replicate(&CubeMetricResult::new(0, value), available),
        MetricOutput::Json(value) => normalize_json(value, available),
    }
}

fn match_percentiles(results: Vec<CubeMetricResult>, available: &[Percentile]) -> NormalizedMetrics {
    let mut by_percentile: BTreeMap<Percentile, CubeMetricResult> = BTreeMap::new();
    for result in results {
        by_percentile.entry(result.percentile.value).or_insert(result);
    }

    let mut normalized = NormalizedMetrics::default();
    for &percentile in available {
        match by_percentile.remove(&percentile) {
            Some(result) => normalized.results.push(result),
            None => {
                normalized.results.push(CubeMetricResult::zero(percentile));
                normalized.placeholders.push(percentile);
            }
        }
    }
    normalized
}

fn replicate(template: &CubeMetricResult, available: &[Percentile]) -> NormalizedMetrics {
    NormalizedMetrics {
        results: available
            .iter()
            .map(|&p| CubeMetricResult {
                percentile: PercentileRef::new(p),
                ..template.clone()
            })
            .collect(),
        placeholders: Vec::new(),
    }
}

fn normalize_json(value: Value, available: &[Percentile]) -> NormalizedMetrics {
    let scalar = |v: f64| replicate(&CubeMetricResult::new(0, v), available);
    match value {
        Value::Number(n) => scalar(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => scalar(s.trim().parse().unwrap_or(f64::NAN)),
        Value::Bool(b) => scalar(if b { 1.0 } else { 0.0 }),
        Value::Null => scalar(0.0),
        Value::Array(_) => match serde_json::from_value::<Vec<CubeMetricResult>>(value.clone()) {
            Ok(results) => match_percentiles(results, available),
            Err(_) => verbatim(value, available),
        },
        Value::Object(_) => match serde_json::from_value::<CubeMetricResult>(value.clone()) {
            Ok(result) => replicate(&result, available),
            Err(_) => verbatim(value, available),
        },
    }
}

fn verbatim(value: Value, available: &[Percentile]) -> NormalizedMetrics {
    let mut template = CubeMetricResult::new(0, f64::NAN);
    template.raw = Some(value);
    replicate(&template, available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PERCENTILES: [Percentile; 3] = [10, 50, 90];

    fn values(normalized: &NormalizedMetrics) -> Vec<f64> {
        normalized.results.iter().map(|r| r.value).collect()
    }

    #[test]
    fn test_results_length_repaired() {
        let output = MetricOutput::Results(vec![
            CubeMetricResult::new(90, 9.0),
            CubeMetricResult::new(10, 1.0),
            CubeMetricResult::new(75, 7.5),
        ]);
        let normalized = normalize_metric_output(output, &PERCENTILES);

        assert_eq!(values(&normalized), vec![1.0, 0.0, 9.0]);
        assert_eq!(normalized.placeholders, vec![50]);
        assert_eq!(normalized.incomplete_percentiles(), vec![50]);
    }

    #[test]
    fn test_single_replicated_with_stats() {
        let stats = BTreeMap::from([("total".to_string(), 12.0)]);
        let output = MetricOutput::Single(CubeMetricResult::new(0, 4.0).with_stats(stats));
        let normalized = normalize_metric_output(output, &PERCENTILES);

        assert_eq!(values(&normalized), vec![4.0; 3]);
        assert!(normalized.results.iter().all(|r| r.stats["total"] == 12.0));
        assert_eq!(normalized.results[2].percentile.value, 90);
    }

    #[test]
    fn test_scalar_has_empty_stats() {
        let normalized = normalize_metric_output(MetricOutput::Scalar(2.5), &PERCENTILES);
        assert_eq!(values(&normalized), vec![2.5; 3]);
        assert!(normalized.results.iter().all(|r| r.stats.is_empty()));
        assert!(normalized.incomplete_percentiles().is_empty());
    }

    #[test]
    fn test_json_primitive_coercion() {
        let of = |v: Value| values(&normalize_metric_output(MetricOutput::Json(v), &[50]))[0];
        assert_eq!(of(json!(3)), 3.0);
        assert_eq!(of(json!(" 1.25 ")), 1.25);
        assert_eq!(of(json!(true)), 1.0);
        assert_eq!(of(json!(false)), 0.0);
        assert_eq!(of(json!(null)), 0.0);
        assert!(of(json!("n/a")).is_nan());
    }

    #[test]
    fn test_json_result_shapes() {
        let normalized = normalize_metric_output(
            MetricOutput::Json(json!([{"percentile": {"value": 50}, "value": 5.0}])),
            &PERCENTILES,
        );
        assert_eq!(values(&normalized), vec![0.0, 5.0, 0.0]);
        assert_eq!(normalized.placeholders, vec![10, 90]);

        let normalized = normalize_metric_output(
            MetricOutput::Json(json!({"percentile": {"value": 10}, "value": 2.0, "stats": {"k": 1.0}})),
            &PERCENTILES,
        );
        assert_eq!(values(&normalized), vec![2.0; 3]);
    }

    #[test]
    fn test_json_object_kept_verbatim() {
        let payload = json!({"label": "high", "bands": [1, 2]});
        let normalized = normalize_metric_output(MetricOutput::Json(payload.clone()), &PERCENTILES);

        assert!(normalized.results.iter().all(|r| r.value.is_nan()));
        assert_eq!(normalized.results[0].raw.as_ref(), Some(&payload));
        assert_eq!(normalized.incomplete_percentiles(), vec![10, 50, 90]);
    }
}
