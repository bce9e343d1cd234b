//! Check command implementation
//!
//! Reports registry issues found by static analysis and required scenario
//! paths that do not resolve. Nothing is computed.

use crate::config::CubeConfig;
use crate::error::Result;
use cube_engine::analysis::{analyze_metric_registry, analyze_source_registry};
use cube_engine::presets::wind;
use cube_engine::scenario::ScenarioStore;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Run the check command
///
/// Returns whether no problem was found.
pub fn run<W: Write>(config: &CubeConfig, scenario: Option<&Path>, out: &mut W) -> Result<bool> {
    info!("Checking registries and scenario...");
    let store = super::resolve_scenario(config, scenario, &config.percentiles)?;

    let sources = wind::source_registry();
    let metrics = wind::metric_registry();
    writeln!(
        out,
        "Registries: {} sources, {} metrics",
        sources.items.len(),
        metrics.items.len()
    )?;

    let mut problems = 0;
    for issue in analyze_source_registry(&sources)
        .into_iter()
        .chain(analyze_metric_registry(&metrics))
    {
        writeln!(out, "  [issue] {}: {}", issue.id, issue.error)?;
        problems += 1;
    }

    let mut paths = config.required_path_segments();
    paths.extend(wind::required_paths());
    paths.sort();
    paths.dedup();
    for path in &paths {
        if store.value_by_path(path).is_none() {
            writeln!(out, "  [missing] {}", path.join("."))?;
            problems += 1;
        }
    }

    if problems == 0 {
        writeln!(out, "OK: {} required paths resolve", paths.len())?;
    } else {
        writeln!(out, "{problems} problem(s) found")?;
    }
    Ok(problems == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_healthy() {
        let mut buffer = Vec::new();
        assert!(run(&CubeConfig::default(), None, &mut buffer).unwrap());
        assert!(String::from_utf8(buffer).unwrap().contains("OK"));
    }

    #[test]
    fn test_reports_missing_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "settings": {{ "financing": {{ "discountRate": 0.07 }} }} }}"#).unwrap();

        let mut buffer = Vec::new();
        let healthy = run(&CubeConfig::default(), Some(file.path()), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(!healthy);
        assert!(text.contains("[missing] simulation.energyProduction"));
        assert!(text.contains("[missing] costs.capex"));
        assert!(!text.contains("[missing] settings.financing.discountRate"));
    }
}
