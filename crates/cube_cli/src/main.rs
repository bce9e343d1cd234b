//! `cube` binary.

use anyhow::Context;
use clap::{Parser, Subcommand};
use cube_cli::commands;
use cube_cli::config::CubeConfig;
use cube_cli::output::OutputFormat;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Wind-farm financial cube
#[derive(Parser)]
#[command(name = "cube")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "cube.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the cube and print every metric
    Run {
        /// Scenario document (JSON); the built-in sample when omitted
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Output format (table, json, csv)
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },

    /// Rank sensitivity variables by their swing on a metric
    Tornado {
        /// Scenario document (JSON); the built-in sample when omitted
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Target metric id
        #[arg(short, long)]
        metric: Option<String>,

        /// Lower percentile
        #[arg(long)]
        lower: Option<u32>,

        /// Base percentile
        #[arg(long)]
        base: Option<u32>,

        /// Upper percentile
        #[arg(long)]
        upper: Option<u32>,

        /// Ranking (impact, percent-spread)
        #[arg(long)]
        sort: Option<String>,

        /// Output format (table, json, csv)
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },

    /// Run against a seeded Monte-Carlo scenario
    Demo {
        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Number of simulated paths
        #[arg(short = 'n', long)]
        simulations: Option<usize>,

        /// Operating years
        #[arg(short, long)]
        years: Option<i32>,

        /// Write the generated scenario to this file
        #[arg(long)]
        save: Option<PathBuf>,

        /// Output format (table, json, csv)
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },

    /// Check registries and scenario data without computing
    Check {
        /// Scenario document (JSON); the built-in sample when omitted
        #[arg(short, long)]
        scenario: Option<PathBuf>,
    },
}

fn init_tracing(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CubeConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?
        .with_env_override();
    config.validate().context("invalid configuration")?;

    init_tracing(&config.log_level, cli.verbose);
    debug!(config = %cli.config.display(), "configuration loaded");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Run { scenario, format } => {
            let format = format.unwrap_or(config.output_format);
            commands::run::run(&config, scenario.as_deref(), format, &mut out)?;
        }
        Commands::Tornado {
            scenario,
            metric,
            lower,
            base,
            upper,
            sort,
            format,
        } => {
            let mut config = config;
            let sensitivity = &mut config.sensitivity;
            if let Some(metric) = metric {
                sensitivity.target_metric = metric;
            }
            sensitivity.lower = lower.unwrap_or(sensitivity.lower);
            sensitivity.base = base.unwrap_or(sensitivity.base);
            sensitivity.upper = upper.unwrap_or(sensitivity.upper);
            if let Some(sort) = sort {
                sensitivity.sort = sort;
            }
            config.validate().context("invalid tornado arguments")?;
            let format = format.unwrap_or(config.output_format);
            commands::tornado::run(&config, scenario.as_deref(), format, &mut out)?;
        }
        Commands::Demo {
            seed,
            simulations,
            years,
            save,
            format,
        } => {
            let mut config = config;
            let monte_carlo = &mut config.monte_carlo;
            monte_carlo.seed = seed.unwrap_or(monte_carlo.seed);
            monte_carlo.simulations = simulations.unwrap_or(monte_carlo.simulations);
            monte_carlo.years = years.unwrap_or(monte_carlo.years);
            config.validate().context("invalid demo arguments")?;
            let format = format.unwrap_or(config.output_format);
            commands::demo::run(&config, save.as_deref(), format, &mut out)?;
        }
        Commands::Check { scenario } => {
            let healthy = commands::check::run(&config, scenario.as_deref(), &mut out)?;
            if !healthy {
                anyhow::bail!("check found problems");
            }
        }
    }

    info!("done");
    Ok(())
}
