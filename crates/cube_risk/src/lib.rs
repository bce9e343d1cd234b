//! # cube_risk: Sensitivity Analysis (L3)
//!
//! Tornado analysis on top of the registry engines: each sensitivity
//! variable is moved to a lower and an upper percentile while every other
//! variable stays at the base percentile, and the swing of a target metric
//! is recorded.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               cube_risk (L3)                │
//! ├─────────────────────────────────────────────┤
//! │  sensitivity/ - tornado analysis            │
//! └─────────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────────┐
//! │              cube_engine (L2)               │
//! │  compute_source_data, compute_metrics_data  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use cube_engine::presets::wind;
//! use cube_engine::scenario::JsonScenario;
//! use cube_risk::sensitivity::{PercentileTriple, SensitivityAnalyzer};
//!
//! let scenario = JsonScenario::new(wind::sample_scenario(&[10, 50, 90], 20));
//! let sources = wind::source_registry();
//! let metrics = wind::metric_registry();
//!
//! let analyzer = SensitivityAnalyzer::new(&sources, &metrics, &scenario);
//! let tornado = analyzer
//!     .analyze(wind::PROJECT_NPV, PercentileTriple::new(10, 50, 90))
//!     .unwrap();
//!
//! assert_eq!(tornado.entries.len(), 2);
//! assert!(tornado.entries[0].impact >= tornado.entries[1].impact);
//! ```

#![deny(missing_docs)]

pub mod sensitivity;
