//! # cube_cli: Command Line Front End (L4)
//!
//! Runs the wind preset against a scenario document and renders metric
//! tables and tornado charts.
//!
//! # Commands
//!
//! - `cube run` - refresh the cube and print every metric per percentile
//! - `cube tornado` - rank sensitivity variables by their swing on a metric
//! - `cube demo` - run against a seeded Monte-Carlo scenario
//! - `cube check` - report static registry issues and missing scenario data

pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod synth;

pub use config::CubeConfig;
pub use error::{CliError, Result};
pub use output::OutputFormat;
