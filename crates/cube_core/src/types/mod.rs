//! Core time-series and error types.
//!
//! This module provides:
//! - `series`: `TimePoint`, `SimResult`, `CubeMetricResult` and percentile helpers
//! - `error`: Structured error types for the pipeline and the solvers
//!
//! # Re-exports
//!
//! Commonly used types are re-exported at this module level.

pub mod error;
pub mod series;

pub use error::{CubeError, SolverError};
pub use series::{
    series_at_percentile, CubeMetricResult, Percentile, PercentileRef, SimResult, TimePoint,
};
