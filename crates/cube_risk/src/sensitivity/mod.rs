//! Sensitivity (tornado) analysis.
//!
//! - [`SensitivityAnalyzer`]: runs the variable sweeps
//! - [`TornadoResult`]: ranked entries plus excluded variables
//! - [`PercentileTriple`]: the `(lower, base, upper)` percentiles

mod analyzer;
mod tornado;

pub use analyzer::{SensitivityAnalyzer, SensitivityError};
pub use tornado::{
    ExcludedVariable, PercentileTriple, TornadoEntry, TornadoResult, TornadoSort,
};
