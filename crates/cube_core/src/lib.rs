//! # cube_core: Foundation Types for the Windcube Pipeline
//!
//! ## Layer 1 (Foundation) Role
//!
//! cube_core is the bottom layer of the windcube workspace, providing:
//! - Percentile-indexed time-series types (`types::series`)
//! - Structured error types: `CubeError`, `SolverError` (`types::error`)
//! - The per-item audit trail recorder (`audit`)
//! - Root-finding solvers (`math::solvers`)
//! - Financial primitives: NPV, IRR, payback, LCOE, coverage ratios and
//!   statistical reductions (`finance`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other cube_* crates, with minimal external dependencies:
//! - num-traits: Traits for generic numerical computation
//! - chrono: Audit timestamps
//! - serde / serde_json: Serialisation of records and audit data samples
//!
//! ## Usage Examples
//!
//! ```rust
//! use cube_core::finance::{irr, npv};
//! use cube_core::types::TimePoint;
//!
//! let flows = vec![TimePoint::new(0, -100.0), TimePoint::new(1, 110.0)];
//!
//! assert!(npv(&flows, 0.10).abs() < 1e-9);
//! assert!((irr(&flows) - 10.0).abs() < 0.01);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod audit;
pub mod finance;
pub mod math;
pub mod types;
