//! CLI command implementations
//!
//! Each submodule implements a specific CLI command. Commands write their
//! report to the given writer and log progress through `tracing`.

pub mod check;
pub mod demo;
pub mod run;
pub mod tornado;

use crate::config::CubeConfig;
use crate::error::{CliError, Result};
use cube_core::types::Percentile;
use cube_engine::presets::wind;
use cube_engine::scenario::JsonScenario;
use std::path::Path;
use tracing::info;

/// Load a scenario document from a JSON file.
pub fn load_scenario(path: &Path) -> Result<JsonScenario> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::scenario(path, e.to_string()))?;
    JsonScenario::from_json(&text).map_err(|e| CliError::scenario(path, e.to_string()))
}

/// Scenario from the argument, then the configuration, then the built-in
/// sample covering `percentiles`.
pub fn resolve_scenario(
    config: &CubeConfig,
    argument: Option<&Path>,
    percentiles: &[Percentile],
) -> Result<JsonScenario> {
    match argument.or(config.scenario.as_deref()) {
        Some(path) => {
            info!(path = %path.display(), "loading scenario");
            load_scenario(path)
        }
        None => {
            info!("no scenario given, using the built-in sample");
            Ok(JsonScenario::new(wind::sample_scenario(percentiles, config.monte_carlo.years)))
        }
    }
}
