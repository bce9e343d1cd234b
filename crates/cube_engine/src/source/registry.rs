//! Source registry definitions.
//!
//! A [`SourceRegistry`] is plain configuration data: a list of global
//! references plus the [`SourceItem`]s to evaluate. Custom behaviour is
//! injected through explicit function slots ([`SourceTransformer`],
//! [`PointFilter`]) rather than closures over ambient state.

use super::record::ComputedSourceRecord;
use crate::reference::{reference_number, Reference, ReferenceSet};
use crate::scenario::to_path;
use cube_core::types::{CubeError, Percentile, SimResult, TimePoint};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Records produced so far in a run, by id.
pub type ProcessedSources = BTreeMap<String, ComputedSourceRecord>;

/// Per-source percentile overrides.
///
/// A source listed here reads the given percentile of its raw data for
/// every output percentile.
pub type CustomPercentiles = BTreeMap<String, Percentile>;

/// Source type; determines the allowed item shape and processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Read from a path, no multipliers
    Direct,
    /// Read from a path, then adjusted by multipliers
    Indirect,
    /// Computed by a transformer from other sources
    Virtual,
}

impl SourceType {
    /// Processing bucket: direct before indirect before virtual.
    pub fn order(&self) -> u8 {
        match self {
            SourceType::Direct => 0,
            SourceType::Indirect => 1,
            SourceType::Virtual => 2,
        }
    }

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            SourceType::Direct => "direct",
            SourceType::Indirect => "indirect",
            SourceType::Virtual => "virtual",
        }
    }
}

/// Descriptive metadata carried into the computed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Source type
    #[serde(rename = "type")]
    pub kind: SourceType,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Unit of the values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Grouping category (e.g. `revenue`, `cost`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Whether the source is a sensitivity (tornado) variable
    #[serde(default)]
    pub sensitivity: bool,
    /// Free-form extra attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl SourceMetadata {
    /// Metadata with only the type set.
    pub fn new(kind: SourceType) -> Self {
        Self {
            kind,
            name: None,
            unit: None,
            category: None,
            sensitivity: false,
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

    /// Mark as a sensitivity variable.
    pub fn sensitivity_variable(mut self) -> Self {
        self.sensitivity = true;
        self
    }
}

/// How a multiplier value combines with a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiplierOperation {
    /// `value * m`
    Multiply,
    /// `value * (1 + m)^(year - base_year)`
    Compound,
    /// `value * (1 + m * (year - base_year))`
    Simple,
    /// `value + m`
    Summation,
}

impl MultiplierOperation {
    /// Apply the operation to one data point.
    ///
    /// # Examples
    ///
    /// ```
    /// use cube_engine::source::MultiplierOperation;
    ///
    /// let escalated = MultiplierOperation::Compound.apply(100.0, 0.02, 3, 1);
    /// assert!((escalated - 104.04).abs() < 1e-9);
    /// ```
    pub fn apply(&self, value: f64, m: f64, year: i32, base_year: i32) -> f64 {
        let elapsed = year - base_year;
        match self {
            MultiplierOperation::Multiply => value * m,
            MultiplierOperation::Compound => value * (1.0 + m).powi(elapsed),
            MultiplierOperation::Simple => value * (1.0 + m * elapsed as f64),
            MultiplierOperation::Summation => value + m,
        }
    }

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            MultiplierOperation::Multiply => "multiply",
            MultiplierOperation::Compound => "compound",
            MultiplierOperation::Simple => "simple",
            MultiplierOperation::Summation => "summation",
        }
    }
}

impl FromStr for MultiplierOperation {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiply" => Ok(Self::Multiply),
            "compound" => Ok(Self::Compound),
            "simple" => Ok(Self::Simple),
            "summation" => Ok(Self::Summation),
            other => Err(CubeError::UnknownOperation(other.to_string())),
        }
    }
}

/// Predicate `(year, value, percentile)`; `false` leaves the point untouched.
pub type PointFilter = Arc<dyn Fn(i32, f64, Percentile) -> bool + Send + Sync>;

/// One step of a multiplier chain.
#[derive(Clone)]
pub struct Multiplier {
    /// Id of a processed source or a reference providing the factor
    pub id: String,
    /// Combination rule
    pub operation: MultiplierOperation,
    /// Year at which escalation starts
    pub base_year: i32,
    /// Optional point filter
    pub filter: Option<PointFilter>,
}

impl Multiplier {
    /// Create a multiplier.
    pub fn new(id: impl Into<String>, operation: MultiplierOperation, base_year: i32) -> Self {
        Self {
            id: id.into(),
            operation,
            base_year,
            filter: None,
        }
    }

    /// Create a multiplier from an operation name.
    pub fn parse(id: impl Into<String>, operation: &str, base_year: i32) -> Result<Self, CubeError> {
        Ok(Self::new(id, operation.parse()?, base_year))
    }

    /// Restrict the multiplier to points accepted by `filter`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(i32, f64, Percentile) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplier")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("base_year", &self.base_year)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Transformer output before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutput {
    /// One series shared by every percentile
    Series(Vec<TimePoint>),
    /// One series per percentile
    ByPercentile(BTreeMap<Percentile, Vec<TimePoint>>),
    /// Already in canonical shape
    Results(Vec<SimResult>),
    /// Untyped JSON, parsed like raw scenario data
    Json(Value),
}

/// Everything a source transformer may read.
pub struct SourceContext<'a> {
    /// Item id
    pub id: &'a str,
    /// Whether the item declares percentile data
    pub has_percentiles: bool,
    /// Percentiles every record must cover
    pub available_percentiles: &'a [Percentile],
    /// Global references overlaid with the item's local ones
    pub references: &'a ReferenceSet,
    /// Records of items processed earlier in this run
    pub processed: &'a ProcessedSources,
    /// Percentile override for this item, if any
    pub custom_percentile: Option<Percentile>,
    /// Item metadata
    pub metadata: &'a SourceMetadata,
}

impl SourceContext<'_> {
    /// Series of an already processed source at `percentile`.
    pub fn processed_series(&self, id: &str, percentile: Percentile) -> Option<Vec<TimePoint>> {
        self.processed.get(id).map(|record| record.series(percentile))
    }

    /// Value of an already processed source at `(year, percentile)`.
    pub fn processed_value(&self, id: &str, year: i32, percentile: Percentile) -> Option<f64> {
        self.processed.get(id)?.value_at(year, percentile)
    }

    /// Numeric reference value.
    pub fn reference_number(&self, id: &str) -> Option<f64> {
        reference_number(self.references, id)
    }
}

/// Source transformer: `(raw data, context) -> output`.
pub type SourceTransformer =
    Arc<dyn Fn(Option<&Value>, &SourceContext<'_>) -> Result<SourceOutput, CubeError> + Send + Sync>;

/// A named source definition.
#[derive(Clone)]
pub struct SourceItem {
    /// Unique id within the registry
    pub id: String,
    /// Tie-break within a type bucket, ascending
    pub priority: i32,
    /// Scenario path of the raw data
    pub path: Option<Vec<String>>,
    /// Whether the raw data is keyed by percentile
    pub has_percentiles: bool,
    /// Local references (override globals by id)
    pub references: Vec<Reference>,
    /// Optional transformer
    pub transformer: Option<SourceTransformer>,
    /// Multiplier chain, applied in order
    pub multipliers: Vec<Multiplier>,
    /// Metadata
    pub metadata: SourceMetadata,
}

impl SourceItem {
    fn base(id: impl Into<String>, priority: i32, path: Option<Vec<String>>, kind: SourceType) -> Self {
        Self {
            id: id.into(),
            priority,
            path,
            has_percentiles: false,
            references: Vec::new(),
            transformer: None,
            multipliers: Vec::new(),
            metadata: SourceMetadata::new(kind),
        }
    }

    /// A direct source reading `path`.
    pub fn direct(id: impl Into<String>, priority: i32, path: &[&str]) -> Self {
        Self::base(id, priority, Some(to_path(path)), SourceType::Direct)
    }

    /// An indirect source reading `path`; add multipliers with [`Self::with_multiplier`].
    pub fn indirect(id: impl Into<String>, priority: i32, path: &[&str]) -> Self {
        Self::base(id, priority, Some(to_path(path)), SourceType::Indirect)
    }

    /// A virtual source computed by `transformer`.
    pub fn virtual_source<F>(id: impl Into<String>, priority: i32, transformer: F) -> Self
    where
        F: Fn(Option<&Value>, &SourceContext<'_>) -> Result<SourceOutput, CubeError>
            + Send
            + Sync
            + 'static,
    {
        let mut item = Self::base(id, priority, None, SourceType::Virtual);
        item.transformer = Some(Arc::new(transformer));
        item
    }

    /// Declare percentile-keyed raw data.
    pub fn with_percentiles(mut self) -> Self {
        self.has_percentiles = true;
        self
    }

    /// Add a local reference.
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Append a multiplier to the chain.
    pub fn with_multiplier(mut self, multiplier: Multiplier) -> Self {
        self.multipliers.push(multiplier);
        self
    }

    /// Set the transformer.
    pub fn with_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(Option<&Value>, &SourceContext<'_>) -> Result<SourceOutput, CubeError>
            + Send
            + Sync
            + 'static,
    {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Replace the metadata, keeping the declared type.
    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        let kind = self.metadata.kind;
        self.metadata = SourceMetadata { kind, ..metadata };
        self
    }

    /// Force a different declared type (used to build malformed items).
    pub fn with_type(mut self, kind: SourceType) -> Self {
        self.metadata.kind = kind;
        self
    }

    /// Declared type.
    pub fn kind(&self) -> SourceType {
        self.metadata.kind
    }

    /// Check that the item's shape matches its type.
    pub fn validate(&self) -> Result<(), CubeError> {
        let fail = |message: &str| Err(CubeError::configuration(&self.id, message));
        if self.id.is_empty() {
            return Err(CubeError::configuration("<unnamed>", "source id must not be empty"));
        }
        match self.kind() {
            SourceType::Direct => {
                if self.path.is_none() {
                    return fail("direct source requires a path");
                }
                if !self.multipliers.is_empty() {
                    return fail("direct source must not declare multipliers");
                }
            }
            SourceType::Indirect => {
                if self.path.is_none() {
                    return fail("indirect source requires a path");
                }
                if self.multipliers.is_empty() {
                    return fail("indirect source requires at least one multiplier");
                }
            }
            SourceType::Virtual => {
                if self.path.is_some() {
                    return fail("virtual source must not declare a path");
                }
                if self.transformer.is_none() {
                    return fail("virtual source requires a transformer");
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SourceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("path", &self.path)
            .field("has_percentiles", &self.has_percentiles)
            .field("references", &self.references)
            .field("transformer", &self.transformer.is_some())
            .field("multipliers", &self.multipliers)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Static source configuration.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    /// References shared by every item
    pub references: Vec<Reference>,
    /// Items to evaluate
    pub items: Vec<SourceItem>,
}

impl SourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global reference.
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Add an item.
    pub fn with_item(mut self, item: SourceItem) -> Self {
        self.items.push(item);
        self
    }

    /// Item by id.
    pub fn get(&self, id: &str) -> Option<&SourceItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Items in processing order: type bucket, then ascending priority.
    ///
    /// The sort is stable, so items with equal `(type, priority)` keep
    /// their declaration order.
    pub fn processing_order(&self) -> Vec<&SourceItem> {
        self.ordered_indices().into_iter().map(|i| &self.items[i]).collect()
    }

    /// Indices into `items` in processing order.
    pub fn ordered_indices(&self) -> Vec<usize> {
        let mut ordered: Vec<usize> = (0..self.items.len()).collect();
        ordered.sort_by_key(|&i| (self.items[i].kind().order(), self.items[i].priority));
        ordered
    }
}
