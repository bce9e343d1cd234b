//! Demo command: the wind cube over a seeded Monte-Carlo scenario.

use crate::config::CubeConfig;
use crate::error::Result;
use crate::output::OutputFormat;
use crate::synth::monte_carlo_scenario;
use cube_engine::scenario::JsonScenario;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Run the demo command
///
/// Generates `config.monte_carlo.simulations` paths, optionally saves the
/// scenario document to `save`, then runs the cube on it.
pub fn run<W: Write>(
    config: &CubeConfig,
    save: Option<&Path>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let settings = &config.monte_carlo;
    info!(
        simulations = settings.simulations,
        years = settings.years,
        seed = settings.seed,
        "generating Monte-Carlo scenario"
    );
    let document = monte_carlo_scenario(settings, &config.percentiles)?;

    if let Some(path) = save {
        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
        info!(path = %path.display(), "scenario saved");
    }

    super::run::run_scenario(config, JsonScenario::new(document), format, out)
}
