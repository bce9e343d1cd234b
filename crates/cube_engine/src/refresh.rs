//! Headless refresh state machine.
//!
//! A refresh walks the stages
//!
//! ```text
//! Idle -> Initialization -> Dependencies -> Sources -> Metrics -> Complete
//! ```
//!
//! one [`CubeSession::step`] at a time. Any stage may move to
//! [`RefreshStage::Failed`]. Output is published as a [`CubeSnapshot`] only
//! when the metrics stage completes; abandoning a refresh discards whatever
//! the in-flight stages produced.

use crate::analysis::{analyze_metric_registry, analyze_source_registry};
use crate::lookup::{MetricLookup, SourceLookup};
use crate::metric::{
    compute_metrics_data_with_report, ComputedMetricRecord, MetricRegistry, MetricRunReport,
    PercentileInfo,
};
use crate::scenario::ScenarioStore;
use crate::source::{
    compute_source_data_with_report, ComputedSourceRecord, CustomPercentiles, SourceRegistry,
    SourceRunReport,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Stage of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStage {
    /// No refresh in flight
    Idle,
    /// Refresh requested; in-flight output cleared
    Initialization,
    /// Registry analysis and required-data check
    Dependencies,
    /// Source computation
    Sources,
    /// Metric computation
    Metrics,
    /// Snapshot published
    Complete,
    /// A stage failed; the previous snapshot is kept
    Failed {
        /// Name of the failing stage
        stage: &'static str,
        /// What went wrong
        message: String,
    },
}

impl RefreshStage {
    /// Stage name.
    pub fn name(&self) -> &'static str {
        match self {
            RefreshStage::Idle => "idle",
            RefreshStage::Initialization => "initialization",
            RefreshStage::Dependencies => "dependencies",
            RefreshStage::Sources => "sources",
            RefreshStage::Metrics => "metrics",
            RefreshStage::Complete => "complete",
            RefreshStage::Failed { .. } => "failed",
        }
    }

    /// Whether a refresh is running.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RefreshStage::Initialization
                | RefreshStage::Dependencies
                | RefreshStage::Sources
                | RefreshStage::Metrics
        )
    }
}

/// Refresh driver errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// A refresh is running and `force` was not set.
    #[error("Refresh already in flight (stage {stage})")]
    InFlight {
        /// Current stage
        stage: &'static str,
    },

    /// `step` was called with no refresh in flight.
    #[error("No refresh in flight")]
    NotStarted,

    /// A stage failed.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed {
        /// Failing stage
        stage: &'static str,
        /// What went wrong
        message: String,
    },
}

/// Output of a completed refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeSnapshot {
    /// Refresh counter, starting at 1
    pub generation: u64,
    /// Source records
    pub sources: Vec<ComputedSourceRecord>,
    /// Metric records
    pub metrics: Vec<ComputedMetricRecord>,
    /// Source run counters
    pub source_report: SourceRunReport,
    /// Metric run counters
    pub metric_report: MetricRunReport,
}

impl CubeSnapshot {
    /// Source record by id.
    pub fn source(&self, id: &str) -> Option<&ComputedSourceRecord> {
        self.sources.iter().find(|r| r.id == id)
    }

    /// Metric record by id.
    pub fn metric(&self, id: &str) -> Option<&ComputedMetricRecord> {
        self.metrics.iter().find(|r| r.id == id)
    }

    /// Keyed source access.
    pub fn source_lookup(&self) -> SourceLookup<'_> {
        SourceLookup::new(&self.sources)
    }

    /// Keyed metric access.
    pub fn metric_lookup(&self) -> MetricLookup<'_> {
        MetricLookup::new(&self.metrics)
    }
}

#[derive(Debug, Default)]
struct InFlight {
    sources: Vec<ComputedSourceRecord>,
    source_report: SourceRunReport,
}

/// A scenario session that refreshes its cube on request.
///
/// # Examples
///
/// ```
/// use cube_engine::metric::PercentileInfo;
/// use cube_engine::presets::wind;
/// use cube_engine::refresh::{CubeSession, RefreshStage};
/// use cube_engine::scenario::JsonScenario;
///
/// let mut session = CubeSession::new(
///     JsonScenario::new(wind::sample_scenario(&[10, 50, 90], 5)),
///     wind::source_registry(),
///     wind::metric_registry(),
///     PercentileInfo::new(vec![10, 50, 90]),
/// );
///
/// let snapshot = session.run().unwrap();
/// assert_eq!(snapshot.generation, 1);
/// assert_eq!(session.stage(), &RefreshStage::Complete);
/// ```
pub struct CubeSession<S> {
    store: S,
    sources: SourceRegistry,
    metrics: MetricRegistry,
    percentiles: PercentileInfo,
    custom_percentiles: Option<CustomPercentiles>,
    required_paths: Vec<Vec<String>>,
    stage: RefreshStage,
    in_flight: InFlight,
    snapshot: Option<CubeSnapshot>,
    generation: u64,
    stale: bool,
}

impl<S: ScenarioStore> CubeSession<S> {
    /// Create an idle session.
    pub fn new(
        store: S,
        sources: SourceRegistry,
        metrics: MetricRegistry,
        percentiles: PercentileInfo,
    ) -> Self {
        Self {
            store,
            sources,
            metrics,
            percentiles,
            custom_percentiles: None,
            required_paths: Vec::new(),
            stage: RefreshStage::Idle,
            in_flight: InFlight::default(),
            snapshot: None,
            generation: 0,
            stale: true,
        }
    }

    /// Scenario paths that must resolve before sources are computed.
    pub fn with_required_paths(mut self, paths: Vec<Vec<String>>) -> Self {
        self.required_paths = paths;
        self
    }

    /// Per-source percentile overrides.
    pub fn with_custom_percentiles(mut self, custom: CustomPercentiles) -> Self {
        self.custom_percentiles = Some(custom);
        self
    }

    /// Current stage.
    pub fn stage(&self) -> &RefreshStage {
        &self.stage
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> Option<&CubeSnapshot> {
        self.snapshot.as_ref()
    }

    /// Whether the store changed since the last snapshot.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The scenario store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replace the scenario store.
    ///
    /// Any in-flight refresh is abandoned and the current snapshot is
    /// marked stale.
    pub fn update_store(&mut self, store: S) {
        self.abandon();
        self.store = store;
        self.stale = true;
    }

    /// Start a refresh.
    ///
    /// Refused while another refresh is in flight unless `force` is set, in
    /// which case the in-flight output is discarded.
    pub fn request_refresh(&mut self, force: bool) -> Result<(), RefreshError> {
        if self.stage.is_in_flight() {
            if !force {
                return Err(RefreshError::InFlight {
                    stage: self.stage.name(),
                });
            }
            warn!(stage = self.stage.name(), "forcing refresh over in-flight run");
        }
        self.in_flight = InFlight::default();
        self.stage = RefreshStage::Initialization;
        Ok(())
    }

    /// Drop the in-flight refresh, if any, and return to idle.
    pub fn abandon(&mut self) {
        if self.stage.is_in_flight() {
            debug!(stage = self.stage.name(), "refresh abandoned");
            self.in_flight = InFlight::default();
            self.stage = RefreshStage::Idle;
        }
    }

    /// Advance the in-flight refresh by one stage.
    pub fn step(&mut self) -> Result<&RefreshStage, RefreshError> {
        let next = match &self.stage {
            RefreshStage::Initialization => {
                self.in_flight = InFlight::default();
                Ok(RefreshStage::Dependencies)
            }
            RefreshStage::Dependencies => self.check_dependencies().map(|_| RefreshStage::Sources),
            RefreshStage::Sources => {
                let (sources, report) = compute_source_data_with_report(
                    &self.sources,
                    &self.percentiles.available,
                    &self.store,
                    self.custom_percentiles.as_ref(),
                );
                self.in_flight = InFlight {
                    sources,
                    source_report: report,
                };
                Ok(RefreshStage::Metrics)
            }
            RefreshStage::Metrics => {
                self.publish();
                Ok(RefreshStage::Complete)
            }
            _ => return Err(RefreshError::NotStarted),
        };

        match next {
            Ok(stage) => {
                debug!(from = self.stage.name(), to = stage.name(), "refresh stage");
                self.stage = stage;
                Ok(&self.stage)
            }
            Err(message) => {
                let stage = self.stage.name();
                warn!(stage, %message, "refresh stage failed");
                self.in_flight = InFlight::default();
                self.stage = RefreshStage::Failed {
                    stage,
                    message: message.clone(),
                };
                Err(RefreshError::StageFailed { stage, message })
            }
        }
    }

    /// Run a refresh to completion, starting one if none is in flight.
    pub fn run(&mut self) -> Result<&CubeSnapshot, RefreshError> {
        if !self.stage.is_in_flight() {
            self.request_refresh(false)?;
        }
        while self.stage.is_in_flight() {
            self.step()?;
        }
        self.snapshot.as_ref().ok_or(RefreshError::NotStarted)
    }

    fn check_dependencies(&self) -> Result<(), String> {
        if self.percentiles.available.is_empty() {
            return Err("no percentiles available".to_string());
        }
        for issue in analyze_source_registry(&self.sources) {
            warn!(id = %issue.id, error = %issue.error, "source registry issue");
        }
        for issue in analyze_metric_registry(&self.metrics) {
            warn!(id = %issue.id, error = %issue.error, "metric registry issue");
        }
        let missing: Vec<String> = self
            .required_paths
            .iter()
            .filter(|path| self.store.value_by_path(path).is_none())
            .map(|path| path.join("."))
            .collect();
        if !missing.is_empty() {
            return Err(format!("required scenario data missing: {}", missing.join(", ")));
        }
        Ok(())
    }

    fn publish(&mut self) {
        let in_flight = std::mem::take(&mut self.in_flight);
        let lookup = SourceLookup::new(&in_flight.sources);
        let (metrics, metric_report) =
            compute_metrics_data_with_report(&self.metrics, &self.percentiles, &self.store, &lookup);

        self.generation += 1;
        self.stale = false;
        info!(
            generation = self.generation,
            sources = in_flight.sources.len(),
            metrics = metrics.len(),
            "refresh complete"
        );
        self.snapshot = Some(CubeSnapshot {
            generation: self.generation,
            sources: in_flight.sources,
            metrics,
            source_report: in_flight.source_report,
            metric_report,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{to_path, JsonScenario};
    use crate::source::SourceItem;
    use serde_json::json;

    fn session() -> CubeSession<JsonScenario> {
        let sources = SourceRegistry::new().with_item(SourceItem::direct("capex", 1, &["costs", "capex"]));
        CubeSession::new(
            JsonScenario::new(json!({"costs": {"capex": [{"year": 0, "value": -100.0}]}})),
            sources,
            MetricRegistry::new(),
            PercentileInfo::new(vec![50]),
        )
    }

    #[test]
    fn test_stages_in_order() {
        let mut session = session();
        session.request_refresh(false).unwrap();

        let mut seen = vec![session.stage().name()];
        while session.stage().is_in_flight() {
            seen.push(session.step().unwrap().name());
        }
        assert_eq!(
            seen,
            vec!["initialization", "dependencies", "sources", "metrics", "complete"]
        );
        assert_eq!(session.snapshot().unwrap().sources.len(), 1);
        assert!(!session.is_stale());
    }

    #[test]
    fn test_refuses_concurrent_refresh_unless_forced() {
        let mut session = session();
        session.request_refresh(false).unwrap();
        session.step().unwrap();

        assert_eq!(
            session.request_refresh(false),
            Err(RefreshError::InFlight { stage: "dependencies" })
        );
        session.request_refresh(true).unwrap();
        assert_eq!(session.stage(), &RefreshStage::Initialization);
    }

    #[test]
    fn test_abandon_discards_in_flight_output() {
        let mut session = session();
        session.request_refresh(false).unwrap();
        session.step().unwrap();
        session.step().unwrap();
        session.step().unwrap();
        assert_eq!(session.stage(), &RefreshStage::Metrics);

        session.abandon();
        assert_eq!(session.stage(), &RefreshStage::Idle);
        assert!(session.snapshot().is_none());
        assert_eq!(session.step(), Err(RefreshError::NotStarted));
    }

    #[test]
    fn test_missing_required_path_fails_dependencies() {
        let mut session = session().with_required_paths(vec![to_path(&["settings", "financing"])]);
        let err = session.run().unwrap_err();

        assert!(matches!(err, RefreshError::StageFailed { stage: "dependencies", .. }));
        assert!(err.to_string().contains("settings.financing"));
        assert!(matches!(session.stage(), RefreshStage::Failed { .. }));
    }

    #[test]
    fn test_generation_increments_and_store_update_marks_stale() {
        let mut session = session();
        session.run().unwrap();
        session.update_store(JsonScenario::new(json!({"costs": {"capex": [{"year": 0, "value": -50.0}]}})));
        assert!(session.is_stale());

        let snapshot = session.run().unwrap();
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.source("capex").unwrap().value_at(0, 50), Some(-50.0));
    }
}
