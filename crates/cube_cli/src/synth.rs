//! Synthetic Monte-Carlo wind scenario.
//!
//! Annual energy production and first-year electricity price are drawn per
//! path from normal distributions and reduced to percentile series. The
//! rest of the document (settings, costs, debt) comes from the wind preset.

use crate::config::MonteCarloConfig;
use crate::error::{CliError, Result};
use cube_core::types::Percentile;
use cube_engine::presets::wind::{sample_scenario, SAMPLE_P50_ENERGY_MWH, SAMPLE_P50_PRICE};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde_json::{json, Map, Value};

/// Inter-annual variability of energy production.
const ENERGY_VOLATILITY: f64 = 0.09;
/// Long-term uncertainty on the energy yield estimate.
const ENERGY_UNCERTAINTY: f64 = 0.06;
/// Annual price volatility.
const PRICE_VOLATILITY: f64 = 0.12;

/// Linear-interpolated percentile of ascending `sorted` values.
///
/// `q` is in percent.
pub fn percentile_of(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

/// Reduce per-path samples of one year to the requested percentiles.
///
/// With `exceedance`, `P10` is the value exceeded by 10% of paths.
fn reduce(samples: &mut [f64], percentiles: &[Percentile], exceedance: bool) -> Vec<f64> {
    samples.sort_by(f64::total_cmp);
    let samples: &[f64] = samples;
    percentiles
        .iter()
        .map(|&p| {
            let q = if exceedance { 100.0 - p as f64 } else { p as f64 };
            percentile_of(samples, q)
        })
        .collect()
}

fn point(year: i32, value: f64) -> Value {
    json!({ "year": year, "value": value })
}

/// Build a scenario document from `settings.simulations` random paths.
pub fn monte_carlo_scenario(settings: &MonteCarloConfig, percentiles: &[Percentile]) -> Result<Value> {
    if settings.simulations == 0 || settings.years < 1 {
        return Err(CliError::invalid_argument("monte-carlo needs at least one path and one year"));
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let paths = settings.simulations;
    let years = settings.years;

    // One yield-estimate shock per path, shared by all its years.
    let yield_shock: Vec<f64> = (0..paths)
        .map(|_| {
            let z: f64 = StandardNormal.sample(&mut rng);
            1.0 + ENERGY_UNCERTAINTY * z
        })
        .collect();

    let mut energy: Map<String, Value> = percentiles.iter().map(|p| (p.to_string(), json!([]))).collect();
    let mut price = energy.clone();

    let mut energy_samples = vec![0.0; paths];
    let mut price_samples = vec![0.0; paths];
    for year in 1..=years {
        for path in 0..paths {
            let z_energy: f64 = StandardNormal.sample(&mut rng);
            let z_price: f64 = StandardNormal.sample(&mut rng);
            energy_samples[path] =
                (SAMPLE_P50_ENERGY_MWH * yield_shock[path] * (1.0 + ENERGY_VOLATILITY * z_energy)).max(0.0);
            price_samples[path] = (SAMPLE_P50_PRICE * (1.0 + PRICE_VOLATILITY * z_price)).max(0.0);
        }

        let energy_values = reduce(&mut energy_samples, percentiles, true);
        let price_values = reduce(&mut price_samples, percentiles, false);
        for (i, p) in percentiles.iter().enumerate() {
            let key = p.to_string();
            if let Some(Value::Array(series)) = energy.get_mut(&key) {
                series.push(point(year, energy_values[i]));
            }
            if let Some(Value::Array(series)) = price.get_mut(&key) {
                series.push(point(year, price_values[i]));
            }
        }
    }

    let mut document = sample_scenario(percentiles, years);
    document["simulation"] = json!({
        "energyProduction": Value::Object(energy),
        "electricityPrice": Value::Object(price),
        "paths": paths,
        "seed": settings.seed,
    });
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings(seed: u64) -> MonteCarloConfig {
        MonteCarloConfig {
            simulations: 500,
            years: 5,
            seed,
        }
    }

    #[test]
    fn test_percentile_of() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile_of(&sorted, 0.0), 1.0);
        assert_relative_eq!(percentile_of(&sorted, 50.0), 3.0);
        assert_relative_eq!(percentile_of(&sorted, 90.0), 4.6);
        assert!(percentile_of(&[], 50.0).is_nan());
    }

    #[test]
    fn test_seeded_scenario_is_reproducible() {
        let a = monte_carlo_scenario(&settings(7), &[10, 50, 90]).unwrap();
        let b = monte_carlo_scenario(&settings(7), &[10, 50, 90]).unwrap();
        let c = monte_carlo_scenario(&settings(8), &[10, 50, 90]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a["simulation"], c["simulation"]);
    }

    #[test]
    fn test_percentile_conventions() {
        let doc = monte_carlo_scenario(&settings(1), &[10, 50, 90]).unwrap();
        let value = |series: &str, p: &str| {
            doc["simulation"][series][p][0]["value"].as_f64().unwrap()
        };
        // Exceedance: P10 energy is the high case.
        assert!(value("energyProduction", "10") > value("energyProduction", "90"));
        assert!(value("electricityPrice", "10") < value("electricityPrice", "90"));
        assert_eq!(doc["simulation"]["energyProduction"]["50"].as_array().unwrap().len(), 5);
        assert!(doc["costs"]["capex"].is_array());
    }

    #[test]
    fn test_rejects_empty_run() {
        let empty = MonteCarloConfig {
            simulations: 0,
            years: 5,
            seed: 1,
        };
        assert!(monte_carlo_scenario(&empty, &[50]).is_err());
    }
}
