//! Numerical building blocks.
//!
//! - [`solvers`]: root-finding used by the IRR calculation

pub mod solvers;
