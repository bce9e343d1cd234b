//! Multiplier chain application.

use super::normalize::parse_json;
use super::record::AppliedMultiplier;
use super::registry::{Multiplier, ProcessedSources, SourceOutput};
use crate::reference::{as_number, ReferenceSet};
use cube_core::types::{CubeError, Percentile, SimResult};
use std::collections::BTreeMap;

/// Where a multiplier reads its factor from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueLookup {
    /// Same factor for every point
    Constant(f64),
    /// Factor per year
    ByYear(BTreeMap<i32, f64>),
    /// Factor per `(year, percentile)`
    ByYearPercentile(BTreeMap<(i32, Percentile), f64>),
}

impl ValueLookup {
    /// Factor for a point, if the lookup covers it.
    pub fn get(&self, year: i32, percentile: Percentile) -> Option<f64> {
        match self {
            ValueLookup::Constant(value) => Some(*value),
            ValueLookup::ByYear(values) => values.get(&year).copied(),
            ValueLookup::ByYearPercentile(values) => values.get(&(year, percentile)).copied(),
        }
    }

    fn from_results(results: &[SimResult]) -> Self {
        ValueLookup::ByYearPercentile(
            results
                .iter()
                .map(|r| ((r.year, r.percentile.value), r.value))
                .collect(),
        )
    }
}

/// Resolve the factor source of a multiplier.
///
/// Processed sources take precedence over references with the same id. A
/// processed source without percentile data is read per year.
pub fn resolve_lookup(
    id: &str,
    processed: &ProcessedSources,
    references: &ReferenceSet,
) -> Result<ValueLookup, CubeError> {
    if let Some(record) = processed.get(id) {
        if record.has_percentiles {
            return Ok(ValueLookup::from_results(&record.percentile_source));
        }
        let by_year = record
            .percentiles()
            .first()
            .map(|&p| record.series(p).into_iter().map(|tp| (tp.year, tp.value)).collect())
            .unwrap_or_default();
        return Ok(ValueLookup::ByYear(by_year));
    }

    let value = references
        .get(id)
        .ok_or_else(|| CubeError::missing_dependency("multiplier", id))?;
    if let Some(constant) = as_number(value) {
        return Ok(ValueLookup::Constant(constant));
    }

    match parse_json(value)? {
        SourceOutput::Series(series) => Ok(ValueLookup::ByYear(
            series.into_iter().map(|tp| (tp.year, tp.value)).collect(),
        )),
        SourceOutput::Results(results) => Ok(ValueLookup::from_results(&results)),
        SourceOutput::ByPercentile(by_percentile) => Ok(ValueLookup::ByYearPercentile(
            by_percentile
                .into_iter()
                .flat_map(|(p, series)| series.into_iter().map(move |tp| ((tp.year, p), tp.value)))
                .collect(),
        )),
        SourceOutput::Json(_) => Err(CubeError::computation(format!(
            "multiplier '{id}' has no usable values"
        ))),
    }
}

/// Apply one multiplier to every point in place.
///
/// Points rejected by the filter, or for which the lookup has no factor,
/// keep their value and are counted.
pub fn apply_multiplier(
    results: &mut [SimResult],
    multiplier: &Multiplier,
    lookup: &ValueLookup,
) -> AppliedMultiplier {
    let mut applied = AppliedMultiplier {
        id: multiplier.id.clone(),
        operation: multiplier.operation,
        base_year: multiplier.base_year,
        applied: 0,
        filtered: 0,
        missing: 0,
    };

    for result in results.iter_mut() {
        let percentile = result.percentile.value;
        if let Some(filter) = &multiplier.filter {
            if !filter(result.year, result.value, percentile) {
                applied.filtered += 1;
                continue;
            }
        }
        match lookup.get(result.year, percentile) {
            Some(m) => {
                result.value =
                    multiplier
                        .operation
                        .apply(result.value, m, result.year, multiplier.base_year);
                applied.applied += 1;
            }
            None => applied.missing += 1,
        }
    }
    applied
}
