//! Metric registry definitions.

use super::record::ComputedMetricRecord;
use crate::lookup::SourceDataView;
use crate::reference::{reference_number, Reference, ReferenceSet};
use crate::scenario::to_path;
use cube_core::audit::{AuditOperation, AuditTrail};
use cube_core::types::{series_at_percentile, CubeError, CubeMetricResult, Percentile, TimePoint};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Records produced so far in a run, by id.
pub type ProcessedMetrics = BTreeMap<String, ComputedMetricRecord>;

/// Aggregation outputs: `percentile -> output_key -> value`.
pub type AggregationResults = BTreeMap<Percentile, BTreeMap<String, f64>>;

/// Parameter name read by the `npv` aggregation.
pub const DISCOUNT_RATE: &str = "discount_rate";

/// Metric type; `direct` metrics run before `indirect` ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Computed from sources and references
    Direct,
    /// May also read direct metrics
    Indirect,
}

impl MetricType {
    /// Processing bucket.
    pub fn order(&self) -> u8 {
        match self {
            MetricType::Direct => 0,
            MetricType::Indirect => 1,
        }
    }
}

/// Descriptive metadata carried into the computed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMetadata {
    /// Metric type
    #[serde(rename = "type")]
    pub kind: MetricType,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Unit of the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Grouping category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-form extra attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl MetricMetadata {
    /// Metadata with only the type set.
    pub fn new(kind: MetricType) -> Self {
        Self {
            kind,
            name: None,
            unit: None,
            category: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the unit.
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// What a dependency points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// A computed source
    Source,
    /// A metric processed earlier in the run
    Metric,
    /// A reference value
    Reference,
}

impl DependencyKind {
    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            DependencyKind::Source => "source",
            DependencyKind::Metric => "metric",
            DependencyKind::Reference => "reference",
        }
    }
}

/// A declared dependency of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Dependency id
    pub id: String,
    /// Dependency kind
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    /// Scenario path, for references not declared globally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
}

impl Dependency {
    /// Dependency on a computed source.
    pub fn source(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DependencyKind::Source,
            path: None,
        }
    }

    /// Dependency on an earlier metric.
    pub fn metric(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DependencyKind::Metric,
            path: None,
        }
    }

    /// Dependency on a reference, read from `path` unless declared globally.
    pub fn reference(id: impl Into<String>, path: &[&str]) -> Self {
        Self {
            id: id.into(),
            kind: DependencyKind::Reference,
            path: (!path.is_empty()).then(|| to_path(path)),
        }
    }
}

/// Custom fold step `(accumulator, point) -> accumulator`.
pub type Reducer = Arc<dyn Fn(f64, &TimePoint) -> f64 + Send + Sync>;

/// Reduction applied to a filtered time series.
#[derive(Clone)]
pub enum AggregationOp {
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Arithmetic mean
    Mean,
    /// Sum
    Sum,
    /// Population standard deviation
    Stdev,
    /// Most frequent value
    Mode,
    /// Net present value at the `discount_rate` parameter
    Npv,
    /// Custom fold
    Reduce {
        /// Fold step
        reducer: Reducer,
        /// Initial accumulator
        initial: f64,
    },
}

impl AggregationOp {
    /// Custom fold from `initial`.
    pub fn reduce<F>(initial: f64, reducer: F) -> Self
    where
        F: Fn(f64, &TimePoint) -> f64 + Send + Sync + 'static,
    {
        AggregationOp::Reduce {
            reducer: Arc::new(reducer),
            initial,
        }
    }

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            AggregationOp::Min => "min",
            AggregationOp::Max => "max",
            AggregationOp::Mean => "mean",
            AggregationOp::Sum => "sum",
            AggregationOp::Stdev => "stdev",
            AggregationOp::Mode => "mode",
            AggregationOp::Npv => "npv",
            AggregationOp::Reduce { .. } => "reduce",
        }
    }
}

impl fmt::Debug for AggregationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationOp::Reduce { initial, .. } => {
                f.debug_struct("Reduce").field("initial", initial).finish()
            }
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for AggregationOp {
    type Err = CubeError;

    /// Parse a named reduction. `reduce` needs a reducer and is not parseable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "stdev" => Ok(Self::Stdev),
            "mode" => Ok(Self::Mode),
            "npv" => Ok(Self::Npv),
            other => Err(CubeError::UnknownOperation(other.to_string())),
        }
    }
}

/// Parameter computed from the references and the metrics processed so far.
pub type DerivedParameter = Arc<dyn Fn(&ReferenceSet, &ProcessedMetrics) -> Option<f64> + Send + Sync>;

/// Aggregation parameter value.
#[derive(Clone)]
pub enum Parameter {
    /// Literal value
    Fixed(f64),
    /// Numeric reference by id
    Reference(String),
    /// Computed once per metric
    Derived(DerivedParameter),
}

impl Parameter {
    /// Parameter read from a reference.
    pub fn reference(id: impl Into<String>) -> Self {
        Parameter::Reference(id.into())
    }

    /// Parameter computed by `f`.
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&ReferenceSet, &ProcessedMetrics) -> Option<f64> + Send + Sync + 'static,
    {
        Parameter::Derived(Arc::new(f))
    }

    /// Resolve the parameter; `None` when its input is unavailable.
    pub fn resolve(&self, references: &ReferenceSet, metrics: &ProcessedMetrics) -> Option<f64> {
        match self {
            Parameter::Fixed(value) => Some(*value),
            Parameter::Reference(id) => reference_number(references, id),
            Parameter::Derived(f) => f(references, metrics),
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Parameter::Reference(id) => f.debug_tuple("Reference").field(id).finish(),
            Parameter::Derived(_) => f.write_str("Derived"),
        }
    }
}

/// Predicate selecting the points an aggregation reads.
pub type SeriesFilter = Arc<dyn Fn(&TimePoint) -> bool + Send + Sync>;

/// One statistic computed per percentile.
#[derive(Clone)]
pub struct Aggregation {
    /// Source the series is read from
    pub source_id: String,
    /// Reduction
    pub operation: AggregationOp,
    /// Key under which the result is stored in `stats`
    pub output_key: String,
    /// Whether this aggregation supplies the metric value on fallback
    pub is_default: bool,
    /// Named parameters
    pub parameters: BTreeMap<String, Parameter>,
    /// Optional point filter
    pub filter: Option<SeriesFilter>,
}

impl Aggregation {
    /// Create an aggregation.
    pub fn new(source_id: impl Into<String>, operation: AggregationOp, output_key: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            operation,
            output_key: output_key.into(),
            is_default: false,
            parameters: BTreeMap::new(),
            filter: None,
        }
    }

    /// Mark as the default-value aggregation.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Set a named parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, parameter: Parameter) -> Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    /// Set the `discount_rate` parameter.
    pub fn with_discount_rate(self, parameter: Parameter) -> Self {
        self.with_parameter(DISCOUNT_RATE, parameter)
    }

    /// Restrict to points accepted by `filter`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&TimePoint) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregation")
            .field("source_id", &self.source_id)
            .field("operation", &self.operation)
            .field("output_key", &self.output_key)
            .field("is_default", &self.is_default)
            .field("parameters", &self.parameters)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Everything a metric declared as a dependency, resolved.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    /// Source data keyed by source id, then by percentile
    pub sources: BTreeMap<String, SourceDataView>,
    /// Earlier metric records by id
    pub metrics: BTreeMap<String, ComputedMetricRecord>,
    /// Global references overlaid with the metric's own
    pub references: ReferenceSet,
}

impl ResolvedDependencies {
    /// Series of a source dependency at `percentile`, ordered by year.
    pub fn source_series(&self, id: &str, percentile: Percentile) -> Vec<TimePoint> {
        self.sources
            .get(id)
            .and_then(|view| view.get(&percentile.to_string()))
            .map(|slice| series_at_percentile(&slice.data, percentile))
            .unwrap_or_default()
    }

    /// Value of a metric dependency at `percentile`.
    pub fn metric_value(&self, id: &str, percentile: Percentile) -> Option<f64> {
        self.metrics.get(id)?.value_at(percentile)
    }

    /// Numeric reference value.
    pub fn reference_number(&self, id: &str) -> Option<f64> {
        reference_number(&self.references, id)
    }
}

/// Context handed to a metric transformer.
pub struct MetricContext<'a> {
    /// Metric id
    pub id: &'a str,
    /// Percentiles the output must cover
    pub available_percentiles: &'a [Percentile],
    /// Aggregation outputs of this metric
    pub aggregation_results: &'a AggregationResults,
    /// Percentile override, if any
    pub custom_percentile: Option<Percentile>,
    audit: &'a mut AuditTrail,
}

impl<'a> MetricContext<'a> {
    pub(crate) fn new(
        id: &'a str,
        available_percentiles: &'a [Percentile],
        aggregation_results: &'a AggregationResults,
        custom_percentile: Option<Percentile>,
        audit: &'a mut AuditTrail,
    ) -> Self {
        Self {
            id,
            available_percentiles,
            aggregation_results,
            custom_percentile,
            audit,
        }
    }

    /// Aggregation output at `percentile`.
    pub fn aggregation(&self, percentile: Percentile, key: &str) -> Option<f64> {
        self.aggregation_results.get(&percentile)?.get(key).copied()
    }

    /// Record a custom entry in the metric's audit trail.
    pub fn add_audit_entry(
        &mut self,
        step: &str,
        details: impl Into<String>,
        dependencies: &[&str],
        data: Option<Value>,
    ) {
        self.audit
            .add_entry(step, AuditOperation::Custom, details, dependencies, data);
    }
}

/// Transformer output before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutput {
    /// One result per percentile
    Results(Vec<CubeMetricResult>),
    /// One result replicated to every percentile
    Single(CubeMetricResult),
    /// One number replicated to every percentile
    Scalar(f64),
    /// Untyped JSON
    Json(Value),
}

/// Metric transformer.
pub type MetricTransformer = Arc<
    dyn Fn(&ResolvedDependencies, &mut MetricContext<'_>) -> Result<MetricOutput, CubeError>
        + Send
        + Sync,
>;

/// Post-hoc operation `(base, percentile, target, references, metrics) -> value`.
pub type OperationFn =
    Arc<dyn Fn(f64, Percentile, f64, &ReferenceSet, &ProcessedMetrics) -> f64 + Send + Sync>;

/// Operation combining the metric value with a reference or earlier metric.
#[derive(Clone)]
pub struct MetricOperation {
    /// Reference or metric id supplying the target value
    pub id: String,
    /// Combination function
    pub operation: OperationFn,
}

impl MetricOperation {
    /// Create an operation.
    pub fn new<F>(id: impl Into<String>, operation: F) -> Self
    where
        F: Fn(f64, Percentile, f64, &ReferenceSet, &ProcessedMetrics) -> f64 + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            operation: Arc::new(operation),
        }
    }
}

impl fmt::Debug for MetricOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricOperation").field("id", &self.id).finish()
    }
}

/// A named metric definition.
#[derive(Clone)]
pub struct MetricItem {
    /// Unique id within the registry
    pub id: String,
    /// Tie-break within a type bucket, ascending
    pub priority: i32,
    /// Declared dependencies
    pub dependencies: Vec<Dependency>,
    /// Aggregations, evaluated per percentile
    pub aggregations: Vec<Aggregation>,
    /// Optional transformer
    pub transformer: Option<MetricTransformer>,
    /// Operations, applied in order
    pub operations: Vec<MetricOperation>,
    /// Metadata
    pub metadata: MetricMetadata,
}

impl MetricItem {
    fn base(id: impl Into<String>, priority: i32, kind: MetricType) -> Self {
        Self {
            id: id.into(),
            priority,
            dependencies: Vec::new(),
            aggregations: Vec::new(),
            transformer: None,
            operations: Vec::new(),
            metadata: MetricMetadata::new(kind),
        }
    }

    /// A direct metric.
    pub fn direct(id: impl Into<String>, priority: i32) -> Self {
        Self::base(id, priority, MetricType::Direct)
    }

    /// An indirect metric.
    pub fn indirect(id: impl Into<String>, priority: i32) -> Self {
        Self::base(id, priority, MetricType::Indirect)
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Add an aggregation.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Set the transformer.
    pub fn with_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(&ResolvedDependencies, &mut MetricContext<'_>) -> Result<MetricOutput, CubeError>
            + Send
            + Sync
            + 'static,
    {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Append an operation.
    pub fn with_operation(mut self, operation: MetricOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Replace the metadata, keeping the declared type.
    pub fn with_metadata(mut self, metadata: MetricMetadata) -> Self {
        let kind = self.metadata.kind;
        self.metadata = MetricMetadata { kind, ..metadata };
        self
    }

    /// Declared type.
    pub fn kind(&self) -> MetricType {
        self.metadata.kind
    }

    /// Ids of metrics this item reads, through dependencies or operations.
    pub fn metric_dependencies(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Metric)
            .map(|d| d.id.as_str())
            .chain(self.operations.iter().map(|op| op.id.as_str()))
            .collect()
    }

    /// Check the item's shape.
    pub fn validate(&self) -> Result<(), CubeError> {
        if self.id.is_empty() {
            return Err(CubeError::configuration("<unnamed>", "metric id must not be empty"));
        }
        if let Some(aggregation) = self.aggregations.iter().find(|a| a.output_key.is_empty()) {
            return Err(CubeError::configuration(
                &self.id,
                format!("aggregation over '{}' has no output key", aggregation.source_id),
            ));
        }
        if let Some(dependency) = self
            .dependencies
            .iter()
            .find(|d| d.kind != DependencyKind::Reference && d.path.is_some())
        {
            return Err(CubeError::configuration(
                &self.id,
                format!("{} dependency '{}' must not declare a path", dependency.kind.name(), dependency.id),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for MetricItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("aggregations", &self.aggregations)
            .field("transformer", &self.transformer.is_some())
            .field("operations", &self.operations)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Static metric configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    /// References shared by every metric
    pub references: Vec<Reference>,
    /// Metrics to evaluate
    pub items: Vec<MetricItem>,
}

impl MetricRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global reference.
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Add a metric.
    pub fn with_item(mut self, item: MetricItem) -> Self {
        self.items.push(item);
        self
    }

    /// Metric by id.
    pub fn get(&self, id: &str) -> Option<&MetricItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Indices into `items` in `(type, priority)` order.
    pub fn ordered_indices(&self) -> Vec<usize> {
        let mut ordered: Vec<usize> = (0..self.items.len()).collect();
        ordered.sort_by_key(|&i| (self.items[i].kind().order(), self.items[i].priority));
        ordered
    }

    /// Items in processing order.
    pub fn processing_order(&self) -> Vec<&MetricItem> {
        self.ordered_indices().into_iter().map(|i| &self.items[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_op_parse() {
        assert!(matches!("npv".parse::<AggregationOp>(), Ok(AggregationOp::Npv)));
        assert_eq!(
            "median".parse::<AggregationOp>().unwrap_err(),
            CubeError::UnknownOperation("median".into())
        );
        assert_eq!(AggregationOp::reduce(0.0, |acc, p| acc + p.value).name(), "reduce");
    }

    #[test]
    fn test_parameter_resolution() {
        let references = ReferenceSet::from([("rate".to_string(), serde_json::json!(0.07))]);
        let metrics = ProcessedMetrics::new();

        assert_eq!(Parameter::Fixed(0.1).resolve(&references, &metrics), Some(0.1));
        assert_eq!(Parameter::reference("rate").resolve(&references, &metrics), Some(0.07));
        assert_eq!(Parameter::reference("nope").resolve(&references, &metrics), None);

        let derived = Parameter::derived(|refs, _| reference_number(refs, "rate").map(|r| r * 2.0));
        assert_eq!(derived.resolve(&references, &metrics), Some(0.14));
    }

    #[test]
    fn test_processing_order_direct_first() {
        let registry = MetricRegistry::new()
            .with_item(MetricItem::indirect("ratio", 0))
            .with_item(MetricItem::direct("b", 2))
            .with_item(MetricItem::direct("a", 1));
        let ids: Vec<&str> = registry.processing_order().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "ratio"]);
    }

    #[test]
    fn test_validate() {
        assert!(MetricItem::direct("", 0).validate().is_err());
        let no_key = MetricItem::direct("m", 0).with_aggregation(Aggregation::new("s", AggregationOp::Sum, ""));
        assert!(no_key.validate().unwrap_err().is_configuration());
        assert!(MetricItem::direct("m", 0)
            .with_dependency(Dependency::reference("rate", &["settings", "rate"]))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_metric_dependencies_include_operations() {
        let item = MetricItem::indirect("m", 0)
            .with_dependency(Dependency::metric("npv"))
            .with_dependency(Dependency::source("capex"))
            .with_operation(MetricOperation::new("capacity", |base, _, target, _, _| base / target));
        assert_eq!(item.metric_dependencies(), vec!["npv", "capacity"]);
    }
}
