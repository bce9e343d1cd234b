//! Run command implementation
//!
//! Refreshes the wind cube once and prints every metric per percentile.

use crate::config::CubeConfig;
use crate::error::Result;
use crate::output::{write_metrics, OutputFormat};
use cube_engine::metric::PercentileInfo;
use cube_engine::presets::wind;
use cube_engine::refresh::CubeSession;
use cube_engine::scenario::JsonScenario;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Build a session over the wind preset.
pub fn session(config: &CubeConfig, scenario: JsonScenario) -> CubeSession<JsonScenario> {
    CubeSession::new(
        scenario,
        wind::source_registry(),
        wind::metric_registry(),
        PercentileInfo::new(config.percentiles.clone()),
    )
    .with_required_paths(config.required_path_segments())
}

/// Refresh `scenario` and write the metric table.
pub fn run_scenario<W: Write>(
    config: &CubeConfig,
    scenario: JsonScenario,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let mut session = session(config, scenario);
    let snapshot = session.run()?;

    let sources = &snapshot.source_report;
    let metrics = &snapshot.metric_report;
    info!(
        sources = sources.processed,
        metrics = metrics.processed,
        missing_data = metrics.missing_data,
        "cube refreshed"
    );
    if !sources.is_clean() || !metrics.is_clean() {
        warn!(
            skipped = sources.errors.len() + metrics.errors.len(),
            "some items were skipped, see earlier warnings"
        );
    }

    write_metrics(out, &snapshot.metrics, &config.percentiles, format)
}

/// Run the run command
pub fn run<W: Write>(
    config: &CubeConfig,
    scenario: Option<&Path>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    info!(percentiles = ?config.percentiles, "starting refresh");
    let scenario = super::resolve_scenario(config, scenario, &config.percentiles)?;
    run_scenario(config, scenario, format, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_on_sample() {
        let config = CubeConfig::default();
        let mut buffer = Vec::new();
        run(&config, None, OutputFormat::Csv, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("metric,unit,P10,P25,P50,P75,P90"));
        assert!(text.lines().any(|line| line.starts_with("projectNpv,")));
    }

    #[test]
    fn test_missing_required_path_fails() {
        let mut config = CubeConfig::default();
        config.required_paths = vec!["settings.nowhere".to_string()];
        let mut buffer = Vec::new();
        assert!(run(&config, None, OutputFormat::Table, &mut buffer).is_err());
        assert!(buffer.is_empty());
    }
}
