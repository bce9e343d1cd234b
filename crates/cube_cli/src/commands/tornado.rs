//! Tornado command implementation

use crate::config::CubeConfig;
use crate::error::Result;
use crate::output::{write_tornado, OutputFormat};
use cube_core::types::Percentile;
use cube_engine::presets::wind;
use cube_risk::sensitivity::SensitivityAnalyzer;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Run the tornado command
pub fn run<W: Write>(
    config: &CubeConfig,
    scenario: Option<&Path>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let triple = config.sensitivity.triple();
    let target = config.sensitivity.target_metric.as_str();
    info!(metric = target, percentiles = %triple, "starting tornado analysis");

    let mut percentiles: Vec<Percentile> = config.percentiles.clone();
    percentiles.extend([triple.lower, triple.base, triple.upper]);
    percentiles.sort_unstable();
    percentiles.dedup();
    let store = super::resolve_scenario(config, scenario, &percentiles)?;

    let sources = wind::source_registry();
    let metrics = wind::metric_registry();
    let tornado = SensitivityAnalyzer::new(&sources, &metrics, &store)
        .with_sort(config.tornado_sort())
        .analyze(target, triple)?;

    info!(
        entries = tornado.entries.len(),
        excluded = tornado.excluded.len(),
        elapsed_ms = tornado.computation_time_ns / 1_000_000,
        "tornado analysis complete"
    );
    write_tornado(out, &tornado, format)
}
