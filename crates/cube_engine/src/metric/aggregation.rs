//! Per-percentile aggregations over source series.

use super::registry::{Aggregation, AggregationOp, DISCOUNT_RATE};
use cube_core::finance;
use cube_core::types::{CubeError, TimePoint};
use std::collections::BTreeMap;

/// Parameters of one aggregation, resolved once per metric.
pub type ResolvedParameters = BTreeMap<String, f64>;

/// Reduce `series` with `operation`.
///
/// An empty series yields `0` for every operation except `reduce`, which
/// yields its initial value.
pub fn aggregate(
    operation: &AggregationOp,
    series: &[TimePoint],
    parameters: &ResolvedParameters,
) -> Result<f64, CubeError> {
    let values: Vec<f64> = series.iter().map(|p| p.value).collect();
    let result = match operation {
        AggregationOp::Min => finance::min(&values),
        AggregationOp::Max => finance::max(&values),
        AggregationOp::Mean => finance::mean(&values),
        AggregationOp::Sum => finance::sum(&values),
        AggregationOp::Stdev => finance::stdev_population(&values),
        AggregationOp::Mode => finance::mode(&values),
        AggregationOp::Npv => {
            let rate = parameters.get(DISCOUNT_RATE).copied().ok_or_else(|| {
                CubeError::computation("npv aggregation requires a discount_rate parameter")
            })?;
            finance::npv(series, rate)
        }
        AggregationOp::Reduce { reducer, initial } => {
            series.iter().fold(*initial, |acc, point| reducer(acc, point))
        }
    };
    Ok(result)
}

/// Apply the aggregation's point filter.
pub fn filter_series(aggregation: &Aggregation, series: Vec<TimePoint>) -> Vec<TimePoint> {
    match &aggregation.filter {
        Some(filter) => series.into_iter().filter(|p| filter(p)).collect(),
        None => series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(values: &[f64]) -> Vec<TimePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| TimePoint::new(i as i32, v))
            .collect()
    }

    #[test]
    fn test_statistics() {
        let s = series(&[2.0, 4.0, 4.0, 6.0]);
        let none = ResolvedParameters::new();
        assert_eq!(aggregate(&AggregationOp::Min, &s, &none).unwrap(), 2.0);
        assert_eq!(aggregate(&AggregationOp::Max, &s, &none).unwrap(), 6.0);
        assert_eq!(aggregate(&AggregationOp::Sum, &s, &none).unwrap(), 16.0);
        assert_eq!(aggregate(&AggregationOp::Mean, &s, &none).unwrap(), 4.0);
        assert_eq!(aggregate(&AggregationOp::Mode, &s, &none).unwrap(), 4.0);
        assert_relative_eq!(
            aggregate(&AggregationOp::Stdev, &s, &none).unwrap(),
            2.0f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_npv_requires_rate() {
        let s = vec![TimePoint::new(0, -100.0), TimePoint::new(1, 110.0)];
        assert!(aggregate(&AggregationOp::Npv, &s, &ResolvedParameters::new()).is_err());

        let params = ResolvedParameters::from([(DISCOUNT_RATE.to_string(), 0.10)]);
        assert_relative_eq!(aggregate(&AggregationOp::Npv, &s, &params).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reduce_and_empty() {
        let product = AggregationOp::reduce(1.0, |acc, p| acc * p.value);
        let none = ResolvedParameters::new();
        assert_eq!(aggregate(&product, &series(&[2.0, 3.0]), &none).unwrap(), 6.0);
        assert_eq!(aggregate(&product, &[], &none).unwrap(), 1.0);
        assert_eq!(aggregate(&AggregationOp::Max, &[], &none).unwrap(), 0.0);
    }

    #[test]
    fn test_filter_operational_years() {
        let aggregation = Aggregation::new("s", AggregationOp::Sum, "total").with_filter(|p| p.year > 0);
        let filtered = filter_series(&aggregation, series(&[-50.0, 10.0, 20.0]));
        assert_eq!(filtered.len(), 2);
    }
}
