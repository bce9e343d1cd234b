//! Error types for structured error handling.
//!
//! This module provides:
//! - `CubeError`: Errors raised while processing a single registry item
//! - `SolverError`: Errors from root-finding solvers

use thiserror::Error;

/// Errors raised while evaluating a source or metric.
///
/// Every variant is contained at the item boundary: the engines catch it,
/// log it, count it and continue with the next registry item.
///
/// # Examples
/// ```
/// use cube_core::types::CubeError;
///
/// let err = CubeError::missing_dependency("metric", "npv");
/// assert_eq!(format!("{}", err), "Missing metric dependency: npv");
/// assert!(err.is_missing_dependency());
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CubeError {
    /// Malformed registry item (wrong type or shape).
    #[error("Configuration error in '{id}': {message}")]
    Configuration {
        /// Registry item identifier
        id: String,
        /// What is wrong with the item
        message: String,
    },

    /// A declared source, metric or reference could not be found.
    #[error("Missing {kind} dependency: {id}")]
    MissingDependency {
        /// Dependency kind (`source`, `metric`, `reference`, `multiplier`)
        kind: String,
        /// Identifier that could not be resolved
        id: String,
    },

    /// Numeric failure (non-finite result, bad transformer output).
    #[error("Computation error: {0}")]
    Computation(String),

    /// Operation name that does not map to a known operation.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// A lookup was issued without any usable filter.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A reference path failed to resolve.
    #[error("Reference '{id}' could not be loaded from path {path:?}")]
    ReferenceLoading {
        /// Reference identifier
        id: String,
        /// Path that was looked up
        path: Vec<String>,
    },

    /// Registry items depend on each other in a cycle.
    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Item identifiers forming the cycle, first element repeated at the end
        cycle: Vec<String>,
    },

    /// Wrapped solver error.
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}

impl CubeError {
    /// Create a configuration error.
    pub fn configuration(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a missing dependency error.
    pub fn missing_dependency(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::MissingDependency {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a computation error.
    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation(message.into())
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter(message.into())
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::CyclicDependency { .. })
    }

    /// Check if this is a missing dependency error.
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, Self::MissingDependency { .. })
    }

    /// Check if this is a computation error.
    pub fn is_computation(&self) -> bool {
        matches!(
            self,
            Self::Computation(_) | Self::UnknownOperation(_) | Self::Solver(_)
        )
    }
}

/// Root-finding solver errors.
///
/// # Examples
/// ```
/// use cube_core::types::SolverError;
///
/// let err = SolverError::MaxIterationsExceeded { iterations: 100, last: 0.1 };
/// assert!(format!("{}", err).contains("100 iterations"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Solver failed to converge within maximum iterations.
    #[error("Failed to converge after {iterations} iterations (last iterate {last})")]
    MaxIterationsExceeded {
        /// Number of iterations attempted
        iterations: usize,
        /// Last iterate reached before giving up
        last: f64,
    },

    /// Derivative near zero (division by zero risk in Newton-Raphson).
    #[error("Derivative near zero at x = {x}")]
    DerivativeNearZero {
        /// The x value where derivative was near zero
        x: f64,
    },

    /// Numerical instability during computation.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
}
