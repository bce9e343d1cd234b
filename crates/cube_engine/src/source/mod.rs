//! Source registry engine.
//!
//! A source is a named, percentile-indexed time series. Sources are read
//! from the scenario document (`direct`), read and then escalated or scaled
//! by a multiplier chain (`indirect`), or computed from other sources by a
//! transformer (`virtual`).
//!
//! ## Processing order
//!
//! Items are sorted by `(type, priority)` with `direct < indirect < virtual`
//! and evaluated one at a time, so a virtual source always sees the
//! records of the direct and indirect sources it reads.

mod engine;
mod multiplier;
mod normalize;
mod record;
mod registry;

pub use engine::{compute_source_data, compute_source_data_with_report, SourceRunReport};
pub use multiplier::{apply_multiplier, resolve_lookup, ValueLookup};
pub use normalize::{normalize_output, parse_json, Normalized};
pub use record::{AppliedMultiplier, ComputedSourceRecord, SourceAudit};
pub use registry::{
    CustomPercentiles, Multiplier, MultiplierOperation, PointFilter, ProcessedSources,
    SourceContext, SourceItem, SourceMetadata, SourceOutput, SourceRegistry, SourceTransformer,
    SourceType,
};
