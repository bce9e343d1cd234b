//! Normalisation of source data into percentile-indexed results.
//!
//! Raw scenario data and transformer outputs come in a handful of shapes.
//! Everything is funnelled through [`SourceOutput`] and then expanded to one
//! [`SimResult`] per `(year, percentile)` over the available percentiles:
//!
//! - a plain series is replicated to every percentile;
//! - a percentile-keyed series missing a percentile, or missing a year that
//!   other percentiles carry, is zero-filled and the percentile recorded;
//! - a custom percentile `p` makes every output percentile read raw
//!   percentile `p`.

use super::registry::SourceOutput;
use crate::reference::as_number;
use cube_core::types::{CubeError, Percentile, SimResult, TimePoint};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Normalised source data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// One result per `(year, percentile)`, grouped by percentile in
    /// available order, years ascending
    pub results: Vec<SimResult>,
    /// Output percentiles that were zero-filled
    pub filled: Vec<Percentile>,
    /// Whether a plain series was copied to every percentile
    pub replicated: bool,
}

/// Parse untyped JSON into a [`SourceOutput`].
///
/// Accepted shapes:
/// - `[{"year": 1, "value": 2.0}, ...]`: a plain series;
/// - `[{"year": 1, "value": 2.0, "percentile": 50}, ...]`: tagged results
///   (`percentile` may also be `{"value": 50}`);
/// - `{"10": [...], "50": [...]}`: a series per percentile.
pub fn parse_json(value: &Value) -> Result<SourceOutput, CubeError> {
    match value {
        Value::Array(items) => {
            let tagged = items.iter().any(|item| item.get("percentile").is_some());
            if tagged {
                items
                    .iter()
                    .map(parse_result)
                    .collect::<Result<Vec<_>, _>>()
                    .map(SourceOutput::Results)
            } else {
                parse_series(items).map(SourceOutput::Series)
            }
        }
        Value::Object(map) => {
            let mut by_percentile = BTreeMap::new();
            for (key, series) in map {
                let percentile: Percentile = key.trim().parse().map_err(|_| {
                    CubeError::computation(format!("'{key}' is not a percentile key"))
                })?;
                let items = series.as_array().ok_or_else(|| {
                    CubeError::computation(format!("percentile {key} does not hold an array"))
                })?;
                by_percentile.insert(percentile, parse_series(items)?);
            }
            Ok(SourceOutput::ByPercentile(by_percentile))
        }
        other => Err(CubeError::computation(format!(
            "unsupported source data shape: {}",
            kind_name(other)
        ))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_series(items: &[Value]) -> Result<Vec<TimePoint>, CubeError> {
    items.iter().map(parse_point).collect()
}

fn parse_point(item: &Value) -> Result<TimePoint, CubeError> {
    let year = item
        .get("year")
        .and_then(as_number)
        .ok_or_else(|| CubeError::computation(format!("data point without a year: {item}")))?;
    let value = item
        .get("value")
        .and_then(as_number)
        .ok_or_else(|| CubeError::computation(format!("data point without a value: {item}")))?;
    Ok(TimePoint::new(year as i32, value))
}

fn parse_result(item: &Value) -> Result<SimResult, CubeError> {
    let point = parse_point(item)?;
    let percentile = match item.get("percentile") {
        Some(Value::Object(tag)) => tag.get("value").and_then(as_number),
        Some(other) => as_number(other),
        None => None,
    }
    .ok_or_else(|| CubeError::computation(format!("data point without a percentile: {item}")))?;
    Ok(SimResult::new(point.year, point.value, percentile as Percentile))
}

/// Expand an output to every available percentile.
///
/// Raw percentiles outside `available` are dropped unless selected by
/// `custom_percentile`.
pub fn normalize_output(
    output: SourceOutput,
    available: &[Percentile],
    custom_percentile: Option<Percentile>,
) -> Result<Normalized, CubeError> {
    match output {
        SourceOutput::Series(series) => Ok(replicate(&series, available)),
        SourceOutput::ByPercentile(by_percentile) => {
            Ok(expand(&by_percentile, available, custom_percentile))
        }
        SourceOutput::Results(results) => {
            let mut by_percentile: BTreeMap<Percentile, Vec<TimePoint>> = BTreeMap::new();
            for result in results {
                by_percentile
                    .entry(result.percentile.value)
                    .or_default()
                    .push(result.time_point());
            }
            Ok(expand(&by_percentile, available, custom_percentile))
        }
        SourceOutput::Json(value) => {
            normalize_output(parse_json(&value)?, available, custom_percentile)
        }
    }
}

fn sorted(series: &[TimePoint]) -> Vec<TimePoint> {
    let mut series = series.to_vec();
    series.sort_by_key(|p| p.year);
    series
}

fn replicate(series: &[TimePoint], available: &[Percentile]) -> Normalized {
    let series = sorted(series);
    let results = available
        .iter()
        .flat_map(|&p| series.iter().map(move |point| SimResult::new(point.year, point.value, p)))
        .collect();
    Normalized {
        results,
        filled: Vec::new(),
        replicated: true,
    }
}

fn expand(
    by_percentile: &BTreeMap<Percentile, Vec<TimePoint>>,
    available: &[Percentile],
    custom_percentile: Option<Percentile>,
) -> Normalized {
    let years: BTreeSet<i32> = by_percentile
        .values()
        .flat_map(|series| series.iter().map(|p| p.year))
        .collect();

    let mut normalized = Normalized::default();
    for &percentile in available {
        let read_from = custom_percentile.unwrap_or(percentile);
        let values: BTreeMap<i32, f64> = by_percentile
            .get(&read_from)
            .map(|series| series.iter().map(|p| (p.year, p.value)).collect())
            .unwrap_or_default();

        let mut filled = false;
        for &year in &years {
            let value = values.get(&year).copied().unwrap_or_else(|| {
                filled = true;
                0.0
            });
            normalized.results.push(SimResult::new(year, value, percentile));
        }
        if filled {
            normalized.filled.push(percentile);
        }
    }
    normalized
}
