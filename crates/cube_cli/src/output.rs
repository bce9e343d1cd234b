//! Rendering of metric tables and tornado results.

use crate::error::{CliError, Result};
use cube_core::types::Percentile;
use cube_engine::metric::ComputedMetricRecord;
use cube_risk::sensitivity::TornadoResult;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::str::FromStr;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text table
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
    /// CSV with a header row
    Csv,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(CliError::invalid_argument(format!(
                "unknown output format '{other}' (expected table, json or csv)"
            ))),
        }
    }
}

fn format_value(value: f64) -> String {
    if !value.is_finite() {
        "n/a".to_string()
    } else if value.abs() >= 1e4 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

/// Write one row per metric with a column per percentile.
pub fn write_metrics<W: Write>(
    out: &mut W,
    metrics: &[ComputedMetricRecord],
    percentiles: &[Percentile],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            write!(out, "{:<16} {:<8}", "Metric", "Unit")?;
            for p in percentiles {
                write!(out, " {:>14}", format!("P{p}"))?;
            }
            writeln!(out)?;
            writeln!(out, "{}", "-".repeat(25 + 15 * percentiles.len()))?;
            for metric in metrics {
                write!(
                    out,
                    "{:<16} {:<8}",
                    metric.id,
                    metric.metadata.unit.as_deref().unwrap_or("")
                )?;
                for &p in percentiles {
                    let cell = metric.value_at(p).map(format_value).unwrap_or_default();
                    write!(out, " {cell:>14}")?;
                }
                writeln!(out)?;
            }
        }
        OutputFormat::Json => {
            let rows: Vec<Value> = metrics
                .iter()
                .map(|metric| {
                    let values: Map<String, Value> = percentiles
                        .iter()
                        .map(|&p| (format!("P{p}"), json!(metric.value_at(p))))
                        .collect();
                    json!({
                        "id": metric.id,
                        "name": metric.metadata.name,
                        "unit": metric.metadata.unit,
                        "values": values,
                    })
                })
                .collect();
            serde_json::to_writer_pretty(&mut *out, &rows)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            let mut header = vec!["metric".to_string(), "unit".to_string()];
            header.extend(percentiles.iter().map(|p| format!("P{p}")));
            writer.write_record(&header)?;
            for metric in metrics {
                let mut row = vec![
                    metric.id.clone(),
                    metric.metadata.unit.clone().unwrap_or_default(),
                ];
                row.extend(
                    percentiles
                        .iter()
                        .map(|&p| metric.value_at(p).map(|v| v.to_string()).unwrap_or_default()),
                );
                writer.write_record(&row)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

/// Write a tornado result in ranking order.
pub fn write_tornado<W: Write>(out: &mut W, tornado: &TornadoResult, format: OutputFormat) -> Result<()> {
    let triple = tornado.percentiles;
    match format {
        OutputFormat::Table => {
            writeln!(
                out,
                "Tornado on {} ({}), base = {}",
                tornado.target_metric,
                triple,
                format_value(tornado.base_value)
            )?;
            writeln!(
                out,
                "{:<20} {:>14} {:>14} {:>14} {:>10}",
                "Variable",
                format!("P{}", triple.lower),
                format!("P{}", triple.upper),
                "Impact",
                "Spread %"
            )?;
            writeln!(out, "{}", "-".repeat(76))?;
            for entry in &tornado.entries {
                writeln!(
                    out,
                    "{:<20} {:>14} {:>14} {:>14} {:>10.2}",
                    entry.variable,
                    format_value(entry.low_value),
                    format_value(entry.high_value),
                    format_value(entry.impact),
                    entry.percent_spread
                )?;
            }
            for excluded in &tornado.excluded {
                writeln!(out, "  excluded {}: {}", excluded.variable, excluded.reason)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, tornado)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(["variable", "low_value", "base_value", "high_value", "impact", "percent_spread"])?;
            for entry in &tornado.entries {
                writer.write_record(&[
                    entry.variable.clone(),
                    entry.low_value.to_string(),
                    entry.base_value.to_string(),
                    entry.high_value.to_string(),
                    entry.impact.to_string(),
                    entry.percent_spread.to_string(),
                ])?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}
