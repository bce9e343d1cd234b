//! Metric registry engine.
//!
//! A metric is a scalar per percentile derived from sources, references and
//! earlier metrics. Each metric runs through the same pipeline:
//!
//! 1. dependency resolution (sources via the provider, metrics from the
//!    records produced so far, references global-first);
//! 2. aggregations per percentile;
//! 3. an optional transformer, whose output is normalised;
//! 4. the default-value fallback for anything the transformer left out;
//! 5. operations, applied in declared order.
//!
//! `direct` metrics run before `indirect` ones, each bucket by ascending
//! priority.

mod aggregation;
mod engine;
mod normalize;
mod record;
mod registry;

pub use aggregation::{aggregate, filter_series, ResolvedParameters};
pub use engine::{
    compute_metrics_data, compute_metrics_data_with_report, MetricRunReport, PercentileInfo,
};
pub use normalize::{normalize_metric_output, NormalizedMetrics};
pub use record::{ComputedMetricRecord, MetricAudit, ValueType};
pub use registry::{
    Aggregation, AggregationOp, AggregationResults, Dependency, DependencyKind, DerivedParameter,
    MetricContext, MetricItem, MetricMetadata, MetricOperation, MetricOutput, MetricRegistry,
    MetricTransformer, MetricType, OperationFn, Parameter, ProcessedMetrics, Reducer,
    ResolvedDependencies, SeriesFilter, DISCOUNT_RATE,
};
