//! Keyed access to computed sources and metrics.
//!
//! Lookups return maps rather than arrays. The key depends on the filter:
//!
//! | filter                         | key        |
//! |--------------------------------|------------|
//! | `source_id` (+ `percentile`)   | percentile |
//! | `source_ids` (+ `percentile`)  | source id  |
//! | `percentile` only              | source id  |
//!
//! A filter with none of the three is rejected with
//! [`CubeError::InvalidFilter`]. Metric lookups follow the same rules.

use crate::metric::{ComputedMetricRecord, MetricMetadata, MetricType};
use crate::source::{ComputedSourceRecord, SourceMetadata, SourceType};
use cube_core::types::{CubeError, CubeMetricResult, Percentile, SimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source data under one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSlice {
    /// Results selected by the filter
    pub data: Vec<SimResult>,
    /// Source metadata
    pub metadata: SourceMetadata,
}

/// Keyed source data.
pub type SourceDataView = BTreeMap<String, SourceSlice>;

/// Restricts a source lookup by metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Required source type
    pub kind: Option<SourceType>,
    /// Required category
    pub category: Option<String>,
}

impl MetadataFilter {
    fn accepts(&self, metadata: &SourceMetadata) -> bool {
        self.kind.map_or(true, |kind| metadata.kind == kind)
            && self
                .category
                .as_ref()
                .map_or(true, |c| metadata.category.as_ref() == Some(c))
    }
}

/// Source lookup filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    /// Single source, keyed by percentile
    pub source_id: Option<String>,
    /// Several sources, keyed by id
    pub source_ids: Option<Vec<String>>,
    /// Restrict to one percentile
    pub percentile: Option<Percentile>,
    /// Restrict by metadata
    pub metadata: Option<MetadataFilter>,
}

impl SourceFilter {
    /// Filter on one source.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            source_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Filter on several sources.
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Filter on every source at one percentile.
    pub fn at_percentile(percentile: Percentile) -> Self {
        Self {
            percentile: Some(percentile),
            ..Self::default()
        }
    }

    /// Add a percentile restriction.
    pub fn with_percentile(mut self, percentile: Percentile) -> Self {
        self.percentile = Some(percentile);
        self
    }

    /// Add a metadata restriction.
    pub fn with_metadata(mut self, metadata: MetadataFilter) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Read access to computed source output.
pub trait SourceDataProvider {
    /// Source data matching `filter`.
    fn source_data(&self, filter: &SourceFilter) -> Result<SourceDataView, CubeError>;
}

impl<F> SourceDataProvider for F
where
    F: Fn(&SourceFilter) -> Result<SourceDataView, CubeError>,
{
    fn source_data(&self, filter: &SourceFilter) -> Result<SourceDataView, CubeError> {
        self(filter)
    }
}

/// [`SourceDataProvider`] over a slice of computed records.
#[derive(Debug, Clone)]
pub struct SourceLookup<'a> {
    records: BTreeMap<&'a str, &'a ComputedSourceRecord>,
}

impl<'a> SourceLookup<'a> {
    /// Index the records by id.
    pub fn new(records: &'a [ComputedSourceRecord]) -> Self {
        Self {
            records: records.iter().map(|r| (r.id.as_str(), r)).collect(),
        }
    }

    /// Record by id.
    pub fn get(&self, id: &str) -> Option<&'a ComputedSourceRecord> {
        self.records.get(id).copied()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn slice(record: &ComputedSourceRecord, percentile: Option<Percentile>) -> SourceSlice {
        SourceSlice {
            data: record
                .percentile_source
                .iter()
                .filter(|r| percentile.map_or(true, |p| r.percentile.value == p))
                .copied()
                .collect(),
            metadata: record.metadata.clone(),
        }
    }

    fn accepts(filter: &SourceFilter, record: &ComputedSourceRecord) -> bool {
        filter
            .metadata
            .as_ref()
            .map_or(true, |m| m.accepts(&record.metadata))
    }
}

impl SourceDataProvider for SourceLookup<'_> {
    fn source_data(&self, filter: &SourceFilter) -> Result<SourceDataView, CubeError> {
        if let Some(id) = &filter.source_id {
            let record = self
                .get(id)
                .ok_or_else(|| CubeError::missing_dependency("source", id))?;
            if !Self::accepts(filter, record) {
                return Ok(SourceDataView::new());
            }
            let percentiles = match filter.percentile {
                Some(p) => vec![p],
                None => record.percentiles(),
            };
            return Ok(percentiles
                .into_iter()
                .map(|p| (p.to_string(), Self::slice(record, Some(p))))
                .filter(|(_, slice)| !slice.data.is_empty())
                .collect());
        }

        if let Some(ids) = &filter.source_ids {
            let mut view = SourceDataView::new();
            for id in ids {
                let record = self
                    .get(id)
                    .ok_or_else(|| CubeError::missing_dependency("source", id))?;
                if Self::accepts(filter, record) {
                    view.insert(id.clone(), Self::slice(record, filter.percentile));
                }
            }
            return Ok(view);
        }

        if let Some(percentile) = filter.percentile {
            return Ok(self
                .records
                .values()
                .filter(|record| Self::accepts(filter, record))
                .map(|record| (record.id.clone(), Self::slice(record, Some(percentile))))
                .collect());
        }

        Err(CubeError::invalid_filter(
            "one of source_id, source_ids or percentile is required",
        ))
    }
}

/// Metric data under one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSlice {
    /// Results selected by the filter
    pub results: Vec<CubeMetricResult>,
    /// Metric metadata
    pub metadata: MetricMetadata,
}

/// Keyed metric data.
pub type MetricView = BTreeMap<String, MetricSlice>;

/// Metric lookup filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFilter {
    /// Single metric, keyed by percentile
    pub metric_id: Option<String>,
    /// Several metrics, keyed by id
    pub metric_ids: Option<Vec<String>>,
    /// Restrict to one percentile
    pub percentile: Option<Percentile>,
    /// Required metric type
    pub kind: Option<MetricType>,
    /// Required category
    pub category: Option<String>,
}

impl MetricFilter {
    /// Filter on one metric.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            metric_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Filter on several metrics.
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric_ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Filter on every metric at one percentile.
    pub fn at_percentile(percentile: Percentile) -> Self {
        Self {
            percentile: Some(percentile),
            ..Self::default()
        }
    }

    /// Add a percentile restriction.
    pub fn with_percentile(mut self, percentile: Percentile) -> Self {
        self.percentile = Some(percentile);
        self
    }

    /// Restrict to a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    fn accepts(&self, metadata: &MetricMetadata) -> bool {
        self.kind.map_or(true, |kind| metadata.kind == kind)
            && self
                .category
                .as_ref()
                .map_or(true, |c| metadata.category.as_ref() == Some(c))
    }
}

/// Keyed access to computed metric records.
#[derive(Debug, Clone)]
pub struct MetricLookup<'a> {
    records: BTreeMap<&'a str, &'a ComputedMetricRecord>,
}

impl<'a> MetricLookup<'a> {
    /// Index the records by id.
    pub fn new(records: &'a [ComputedMetricRecord]) -> Self {
        Self {
            records: records.iter().map(|r| (r.id.as_str(), r)).collect(),
        }
    }

    /// Record by id.
    pub fn get(&self, id: &str) -> Option<&'a ComputedMetricRecord> {
        self.records.get(id).copied()
    }

    fn slice(record: &ComputedMetricRecord, percentile: Option<Percentile>) -> MetricSlice {
        MetricSlice {
            results: record
                .percentile_metrics
                .iter()
                .filter(|r| percentile.map_or(true, |p| r.percentile.value == p))
                .cloned()
                .collect(),
            metadata: record.metadata.clone(),
        }
    }

    /// Metric data matching `filter`.
    pub fn get_metric(&self, filter: &MetricFilter) -> Result<MetricView, CubeError> {
        if let Some(id) = &filter.metric_id {
            let record = self
                .get(id)
                .ok_or_else(|| CubeError::missing_dependency("metric", id))?;
            if !filter.accepts(&record.metadata) {
                return Ok(MetricView::new());
            }
            return Ok(record
                .percentile_metrics
                .iter()
                .map(|r| r.percentile.value)
                .filter(|&p| filter.percentile.map_or(true, |wanted| wanted == p))
                .map(|p| (p.to_string(), Self::slice(record, Some(p))))
                .collect());
        }

        if let Some(ids) = &filter.metric_ids {
            let mut view = MetricView::new();
            for id in ids {
                let record = self
                    .get(id)
                    .ok_or_else(|| CubeError::missing_dependency("metric", id))?;
                if filter.accepts(&record.metadata) {
                    view.insert(id.clone(), Self::slice(record, filter.percentile));
                }
            }
            return Ok(view);
        }

        if let Some(percentile) = filter.percentile {
            return Ok(self
                .records
                .values()
                .filter(|record| filter.accepts(&record.metadata))
                .map(|record| (record.id.clone(), Self::slice(record, Some(percentile))))
                .collect());
        }

        Err(CubeError::invalid_filter(
            "one of metric_id, metric_ids or percentile is required",
        ))
    }
}
