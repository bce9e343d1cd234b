//! # cube_engine: Registry Engines (L2)
//!
//! Evaluates registries of named *sources* and *metrics* against a loaded
//! scenario document, per Monte-Carlo percentile.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             cube_engine (L2)                │
//! ├─────────────────────────────────────────────┤
//! │  analysis/  - static registry checks        │
//! │  scenario/  - value lookup by path          │
//! │  reference/ - global + local references     │
//! │  source/    - compute_source_data           │
//! │  metric/    - compute_metrics_data          │
//! │  lookup/    - keyed source/metric access    │
//! │  refresh/   - staged refresh state machine  │
//! │  presets/   - wind-farm registries          │
//! └─────────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────────┐
//! │              cube_core (L1)                 │
//! │  series types, audit trail, finance         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Items are processed strictly sequentially in type-then-priority order,
//! so any item may read the output of every item sorted before it. A
//! failing item is logged, counted and skipped; it never aborts the run.
//!
//! ## Example
//!
//! ```
//! use cube_engine::lookup::SourceLookup;
//! use cube_engine::metric::{compute_metrics_data, PercentileInfo};
//! use cube_engine::presets::wind;
//! use cube_engine::scenario::JsonScenario;
//! use cube_engine::source::compute_source_data;
//!
//! let scenario = JsonScenario::new(wind::sample_scenario(&[10, 50, 90], 5));
//! let percentiles = vec![10, 50, 90];
//!
//! let sources = compute_source_data(&wind::source_registry(), &percentiles, &scenario, None);
//! let lookup = SourceLookup::new(&sources);
//! let metrics = compute_metrics_data(
//!     &wind::metric_registry(),
//!     &PercentileInfo::new(percentiles),
//!     &scenario,
//!     &lookup,
//! );
//!
//! assert!(metrics.iter().any(|m| m.id == "projectNpv"));
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod analysis;
pub mod lookup;
pub mod metric;
pub mod presets;
pub mod reference;
pub mod refresh;
pub mod scenario;
pub mod source;

pub use lookup::{MetricFilter, MetricLookup, SourceDataProvider, SourceFilter, SourceLookup};
pub use metric::{compute_metrics_data, ComputedMetricRecord, MetricRegistry, PercentileInfo};
pub use refresh::{CubeSession, CubeSnapshot, RefreshError, RefreshStage};
pub use scenario::{JsonScenario, ScenarioStore};
pub use source::{compute_source_data, ComputedSourceRecord, CustomPercentiles, SourceRegistry};
