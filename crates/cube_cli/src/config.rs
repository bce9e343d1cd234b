//! CLI configuration.
//!
//! Loaded from a TOML file, then overridden by `CUBE_*` environment
//! variables. Every field has a default, so an empty file is valid.

use crate::output::OutputFormat;
use cube_core::types::Percentile;
use cube_risk::sensitivity::{PercentileTriple, TornadoSort};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Tornado settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Lower percentile
    pub lower: Percentile,
    /// Base percentile
    pub base: Percentile,
    /// Upper percentile
    pub upper: Percentile,
    /// Ranking, `impact` or `percent-spread`
    pub sort: String,
    /// Default target metric
    pub target_metric: String,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            lower: 10,
            base: 50,
            upper: 90,
            sort: "impact".to_string(),
            target_metric: "projectNpv".to_string(),
        }
    }
}

impl SensitivityConfig {
    /// Percentile triple.
    pub fn triple(&self) -> PercentileTriple {
        PercentileTriple::new(self.lower, self.base, self.upper)
    }
}

/// Monte-Carlo demo settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of simulated paths
    pub simulations: usize,
    /// Operating years
    pub years: i32,
    /// RNG seed
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: 2_000,
            years: 20,
            seed: 42,
        }
    }
}

/// CLI configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CubeConfig {
    /// Percentiles every record covers
    pub percentiles: Vec<Percentile>,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Output format
    pub output_format: OutputFormat,
    /// Default scenario document
    pub scenario: Option<PathBuf>,
    /// Dot-separated scenario paths checked before each refresh
    pub required_paths: Vec<String>,
    /// Tornado settings
    pub sensitivity: SensitivityConfig,
    /// Monte-Carlo demo settings
    pub monte_carlo: MonteCarloConfig,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            percentiles: vec![10, 25, 50, 75, 90],
            log_level: "info".to_string(),
            output_format: OutputFormat::Table,
            scenario: None,
            required_paths: vec![
                "settings.financing.discountRate".to_string(),
                "simulation.energyProduction".to_string(),
            ],
            sensitivity: SensitivityConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
        }
    }
}

impl CubeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path` if it exists, otherwise the defaults.
    ///
    /// A file that exists but does not parse is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides
    pub fn with_env_override(mut self) -> Self {
        if let Ok(percentiles) = std::env::var("CUBE_PERCENTILES") {
            let parsed: Result<Vec<Percentile>, _> =
                percentiles.split(',').map(|p| p.trim().parse()).collect();
            if let Ok(parsed) = parsed {
                self.percentiles = parsed;
            }
        }

        if let Ok(log_level) = std::env::var("CUBE_LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Ok(format) = std::env::var("CUBE_OUTPUT_FORMAT") {
            self.output_format = format.parse().unwrap_or(self.output_format);
        }

        if let Ok(scenario) = std::env::var("CUBE_SCENARIO") {
            self.scenario = Some(PathBuf::from(scenario));
        }

        if let Ok(sort) = std::env::var("CUBE_TORNADO_SORT") {
            self.sensitivity.sort = sort;
        }

        if let Ok(seed) = std::env::var("CUBE_SEED") {
            self.monte_carlo.seed = seed.parse().unwrap_or(self.monte_carlo.seed);
        }

        self
    }

    /// Validate the configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log_level '{}'. Valid values: {:?}",
                self.log_level, valid_log_levels
            ));
        }

        if self.percentiles.is_empty() {
            errors.push("percentiles cannot be empty".to_string());
        }
        if let Some(p) = self.percentiles.iter().find(|&&p| p == 0 || p >= 100) {
            errors.push(format!("percentile {p} is outside 1..=99"));
        }
        let mut sorted = self.percentiles.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.percentiles.len() {
            errors.push("percentiles must not repeat".to_string());
        }

        let triple = self.sensitivity.triple();
        if !triple.is_ordered() {
            errors.push(format!("sensitivity percentiles {triple} must satisfy lower < base < upper"));
        }
        if self.sensitivity.sort.parse::<TornadoSort>().is_err() {
            errors.push(format!(
                "Invalid sensitivity.sort '{}'. Valid values: impact, percent-spread",
                self.sensitivity.sort
            ));
        }

        if self.required_paths.iter().any(|p| p.split('.').any(str::is_empty)) {
            errors.push("required_paths entries must be dot-separated non-empty segments".to_string());
        }

        if self.monte_carlo.simulations < 10 {
            errors.push("monte_carlo.simulations must be at least 10".to_string());
        }
        if !(1..=60).contains(&self.monte_carlo.years) {
            errors.push(format!("monte_carlo.years {} is outside 1..=60", self.monte_carlo.years));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Required paths split into segments.
    pub fn required_path_segments(&self) -> Vec<Vec<String>> {
        self.required_paths
            .iter()
            .map(|p| p.split('.').map(str::to_string).collect())
            .collect()
    }

    /// Tornado ranking; defaults to impact when unparseable.
    pub fn tornado_sort(&self) -> TornadoSort {
        self.sensitivity.sort.parse().unwrap_or_default()
    }
}

/// Configuration error type
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// IO error reading config file
    Io(String),
    /// Parse error in config file
    Parse(String),
    /// Validation error
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
            Self::Validation(errors) => write!(f, "Validation errors: {}", errors.join("; ")),
        }
    }
}

impl std::error::Error for ConfigError {}
