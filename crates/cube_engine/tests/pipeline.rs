//! End-to-end tests for the source and metric engines.
//!
//! Each test builds a small registry against an in-memory scenario and
//! checks one externally visible behaviour of the pipeline.

use approx::assert_relative_eq;
use cube_core::types::{CubeError, CubeMetricResult};
use cube_engine::lookup::SourceLookup;
use cube_engine::metric::{
    compute_metrics_data_with_report, Aggregation, AggregationOp, Dependency, MetricItem,
    MetricOperation, MetricOutput, MetricRegistry, PercentileInfo,
};
use cube_engine::reference::Reference;
use cube_engine::refresh::{CubeSession, RefreshStage};
use cube_engine::scenario::JsonScenario;
use cube_engine::source::{
    compute_source_data_with_report, ComputedSourceRecord, CustomPercentiles, Multiplier,
    MultiplierOperation, SourceItem, SourceOutput, SourceRegistry,
};
use serde_json::{json, Value};

const PERCENTILES: [u32; 3] = [10, 50, 90];

fn scenario() -> JsonScenario {
    JsonScenario::new(json!({
        "settings": { "escalation": 0.02, "offset": 10.0, "factor": 2.0 },
        "flat": [
            { "year": 1, "value": 100.0 },
            { "year": 2, "value": 100.0 },
            { "year": 3, "value": 100.0 }
        ],
        "energy": {
            "10": [{ "year": 1, "value": 120.0 }, { "year": 2, "value": 120.0 }],
            "50": [{ "year": 1, "value": 100.0 }, { "year": 2, "value": 100.0 }],
            "90": [{ "year": 1, "value": 80.0 }, { "year": 2, "value": 80.0 }]
        }
    }))
}

fn run_sources(registry: &SourceRegistry) -> Vec<ComputedSourceRecord> {
    let (records, report) = compute_source_data_with_report(registry, &PERCENTILES, &scenario(), None);
    assert!(report.is_clean(), "{:?}", report.errors);
    records
}

fn find<'a>(records: &'a [ComputedSourceRecord], id: &str) -> &'a ComputedSourceRecord {
    records.iter().find(|r| r.id == id).unwrap()
}

// =============================================================================
// Sources
// =============================================================================

#[test]
fn test_compound_escalation_from_reference() {
    let registry = SourceRegistry::new()
        .with_reference(Reference::new("escalation", &["settings", "escalation"]))
        .with_item(
            SourceItem::indirect("price", 1, &["flat"])
                .with_multiplier(Multiplier::new("escalation", MultiplierOperation::Compound, 1)),
        );

    let records = run_sources(&registry);
    let price = find(&records, "price");

    assert_relative_eq!(price.value_at(1, 50).unwrap(), 100.0, epsilon = 1e-9);
    assert_relative_eq!(price.value_at(2, 50).unwrap(), 102.0, epsilon = 1e-9);
    assert_relative_eq!(price.value_at(3, 50).unwrap(), 104.04, epsilon = 1e-9);
    // Non-percentile data is replicated to every percentile.
    assert_eq!(price.value_at(3, 10), price.value_at(3, 90));
    assert_eq!(price.audit.applied_multipliers[0].applied, 9);
}

#[test]
fn test_items_run_in_type_then_priority_order() {
    // Declared in reverse; each item reads the one before it.
    let registry = SourceRegistry::new()
        .with_item(SourceItem::virtual_source("doubled", 0, |_, ctx| {
            let series = ctx
                .processed_series("scaled", 50)
                .ok_or_else(|| CubeError::missing_dependency("source", "scaled"))?;
            Ok(SourceOutput::Series(
                series.into_iter().map(|p| cube_core::types::TimePoint::new(p.year, p.value * 2.0)).collect(),
            ))
        }))
        .with_item(
            SourceItem::indirect("scaled", 0, &["flat"])
                .with_multiplier(Multiplier::new("energy", MultiplierOperation::Multiply, 1)),
        )
        .with_item(SourceItem::direct("energy", 5, &["energy"]).with_percentiles());

    let records = run_sources(&registry);
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["energy", "scaled", "doubled"]);

    // The multiplier is read per (year, percentile) from the processed source.
    let scaled = find(&records, "scaled");
    assert_relative_eq!(scaled.value_at(1, 10).unwrap(), 12_000.0);
    assert_relative_eq!(scaled.value_at(1, 90).unwrap(), 8_000.0);
    // Year 3 has no multiplier value and is left untouched.
    assert_relative_eq!(scaled.value_at(3, 50).unwrap(), 100.0);

    assert_relative_eq!(find(&records, "doubled").value_at(2, 90).unwrap(), 20_000.0);
}

#[test]
fn test_failing_items_are_skipped_not_fatal() {
    let registry = SourceRegistry::new()
        .with_item(SourceItem::direct("missing", 1, &["nowhere"]))
        .with_item(SourceItem::direct("flat", 2, &["flat"]))
        .with_item(SourceItem::virtual_source("broken", 1, |_, _| {
            Err(CubeError::computation("model diverged"))
        }))
        .with_item(SourceItem::direct("dup", 3, &["flat"]))
        .with_item(SourceItem::direct("dup", 4, &["energy"]).with_percentiles());

    let (records, report) = compute_source_data_with_report(&registry, &PERCENTILES, &scenario(), None);

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["flat", "dup"]);
    assert_eq!(report.processed, 2);
    assert_eq!(report.failures, 2);
    assert_eq!(report.config_errors, 1);
    assert!(report
        .errors
        .iter()
        .any(|(id, e)| id == "missing" && e.is_missing_dependency()));
    // The first declaration of a duplicate id wins.
    assert!(!find(&records, "dup").has_percentiles);
}

#[test]
fn test_invalid_type_skips_only_that_item() {
    let valid = || {
        SourceRegistry::new()
            .with_reference(Reference::new("escalation", &["settings", "escalation"]))
            .with_item(SourceItem::direct("flat", 1, &["flat"]))
            .with_item(SourceItem::direct("energy", 2, &["energy"]).with_percentiles())
            .with_item(
                SourceItem::indirect("price", 1, &["flat"])
                    .with_multiplier(Multiplier::new("escalation", MultiplierOperation::Compound, 1)),
            )
    };
    // A direct item may not carry multipliers; it sorts before every valid item.
    let with_invalid = valid().with_item(
        SourceItem::direct("escalatedFlat", 0, &["flat"])
            .with_multiplier(Multiplier::new("escalation", MultiplierOperation::Compound, 1)),
    );

    let (records, report) = compute_source_data_with_report(&with_invalid, &PERCENTILES, &scenario(), None);
    let (expected, _) = compute_source_data_with_report(&valid(), &PERCENTILES, &scenario(), None);

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["flat", "energy", "price"]);
    assert_eq!(report.config_errors, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(report.processed, 3);
    assert!(report.errors.iter().all(|(id, e)| id == "escalatedFlat" && e.is_configuration()));
    for (record, reference) in records.iter().zip(&expected) {
        assert_eq!(record.percentile_source, reference.percentile_source);
    }
}

#[test]
fn test_custom_percentile_reads_one_column() {
    let registry = SourceRegistry::new().with_item(SourceItem::direct("energy", 1, &["energy"]).with_percentiles());
    let custom = CustomPercentiles::from([("energy".to_string(), 10)]);

    let (records, _) = compute_source_data_with_report(&registry, &PERCENTILES, &scenario(), Some(&custom));
    let energy = find(&records, "energy");
    for p in PERCENTILES {
        assert_relative_eq!(energy.value_at(1, p).unwrap(), 120.0);
    }
}

#[test]
fn test_missing_percentile_is_zero_filled() {
    let registry = SourceRegistry::new().with_item(SourceItem::direct("energy", 1, &["energy"]).with_percentiles());
    let (records, _) = compute_source_data_with_report(&registry, &[10, 50, 75], &scenario(), None);
    let energy = find(&records, "energy");

    assert_eq!(energy.value_at(1, 75), Some(0.0));
    assert!(energy.is_filled(75));
    assert!(!energy.is_filled(50));
}

// =============================================================================
// Metrics
// =============================================================================

fn metric_sources() -> Vec<ComputedSourceRecord> {
    run_sources(
        &SourceRegistry::new()
            .with_item(SourceItem::direct("energy", 1, &["energy"]).with_percentiles())
            .with_item(SourceItem::direct("flat", 2, &["flat"])),
    )
}

fn metric_references() -> MetricRegistry {
    MetricRegistry::new()
        .with_reference(Reference::new("offset", &["settings", "offset"]))
        .with_reference(Reference::new("factor", &["settings", "factor"]))
}

#[test]
fn test_default_aggregation_fills_missing_percentiles() {
    let sources = metric_sources();
    let registry = metric_references().with_item(
        MetricItem::direct("energyTotal", 1)
            .with_aggregation(Aggregation::new("energy", AggregationOp::Sum, "total").as_default())
            .with_aggregation(Aggregation::new("energy", AggregationOp::Max, "peak"))
            .with_transformer(|_, _| Ok(MetricOutput::Results(vec![CubeMetricResult::new(10, 1.0)]))),
    );

    let (metrics, report) = compute_metrics_data_with_report(
        &registry,
        &PercentileInfo::new(PERCENTILES.to_vec()),
        &scenario(),
        &SourceLookup::new(&sources),
    );
    assert!(report.is_clean());

    let total = &metrics[0];
    assert_eq!(total.value_at(10), Some(1.0));
    assert_eq!(total.value_at(50), Some(200.0));
    assert_eq!(total.value_at(90), Some(160.0));
    assert_eq!(total.audit.fallback_percentiles, vec![50, 90]);
    // Aggregation outputs are attached as stats.
    assert_eq!(total.stat_at(90, "peak"), Some(80.0));
}

#[test]
fn test_operations_apply_in_declared_order() {
    let sources = metric_sources();
    let add_then_scale = MetricItem::direct("a", 1)
        .with_aggregation(Aggregation::new("flat", AggregationOp::Sum, "sum").as_default())
        .with_operation(MetricOperation::new("offset", |base, _, target, _, _| base + target))
        .with_operation(MetricOperation::new("factor", |base, _, target, _, _| base * target));
    let scale_then_add = MetricItem::direct("b", 2)
        .with_aggregation(Aggregation::new("flat", AggregationOp::Sum, "sum").as_default())
        .with_operation(MetricOperation::new("factor", |base, _, target, _, _| base * target))
        .with_operation(MetricOperation::new("offset", |base, _, target, _, _| base + target));
    let registry = metric_references().with_item(add_then_scale).with_item(scale_then_add);

    let run = || {
        compute_metrics_data_with_report(
            &registry,
            &PercentileInfo::new(PERCENTILES.to_vec()),
            &scenario(),
            &SourceLookup::new(&sources),
        )
        .0
    };
    let first = run();
    assert_eq!(first[0].value_at(50), Some(620.0));
    assert_eq!(first[1].value_at(50), Some(610.0));
    assert_eq!(first, run());
}

#[test]
fn test_missing_source_aggregates_to_zero() {
    let sources = metric_sources();
    let registry = metric_references().with_item(
        MetricItem::direct("ghost", 1)
            .with_aggregation(Aggregation::new("nonexistent", AggregationOp::Mean, "mean").as_default()),
    );

    let (metrics, report) = compute_metrics_data_with_report(
        &registry,
        &PercentileInfo::new(PERCENTILES.to_vec()),
        &scenario(),
        &SourceLookup::new(&sources),
    );
    assert!(report.is_clean());
    assert_eq!(report.missing_data, 3);
    assert!(metrics[0].percentile_metrics.iter().all(|r| r.value == 0.0));
}

#[test]
fn test_custom_percentile_applies_to_every_output() {
    let sources = metric_sources();
    let registry = metric_references().with_item(
        MetricItem::direct("energyTotal", 1)
            .with_aggregation(Aggregation::new("energy", AggregationOp::Sum, "total").as_default()),
    );

    let (metrics, _) = compute_metrics_data_with_report(
        &registry,
        &PercentileInfo::new(PERCENTILES.to_vec()).with_custom(90),
        &scenario(),
        &SourceLookup::new(&sources),
    );
    for p in PERCENTILES {
        assert_eq!(metrics[0].value_at(p), Some(160.0));
    }
}

#[test]
fn test_cycles_are_rejected_and_dependents_fail() {
    let sources = metric_sources();
    let registry = metric_references()
        .with_item(MetricItem::indirect("a", 1).with_dependency(Dependency::metric("b")))
        .with_item(MetricItem::indirect("b", 2).with_dependency(Dependency::metric("a")))
        .with_item(MetricItem::indirect("c", 3).with_dependency(Dependency::metric("a")))
        .with_item(
            MetricItem::direct("ok", 1)
                .with_aggregation(Aggregation::new("flat", AggregationOp::Sum, "sum").as_default()),
        );

    let (metrics, report) = compute_metrics_data_with_report(
        &registry,
        &PercentileInfo::new(PERCENTILES.to_vec()),
        &scenario(),
        &SourceLookup::new(&sources),
    );

    let ids: Vec<&str> = metrics.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
    assert_eq!(report.config_errors, 2);
    assert_eq!(report.failures, 1);
    assert!(matches!(
        report.errors.iter().find(|(id, _)| id == "a").map(|(_, e)| e),
        Some(CubeError::CyclicDependency { .. })
    ));
}

// =============================================================================
// Refresh
// =============================================================================

#[test]
fn test_session_refresh_cycle() {
    let sources = SourceRegistry::new().with_item(SourceItem::direct("flat", 1, &["flat"]));
    let metrics = MetricRegistry::new().with_item(
        MetricItem::direct("total", 1)
            .with_aggregation(Aggregation::new("flat", AggregationOp::Sum, "sum").as_default()),
    );
    let mut session = CubeSession::new(scenario(), sources, metrics, PercentileInfo::new(vec![50]));

    let snapshot = session.run().unwrap();
    assert_eq!(snapshot.generation, 1);
    assert_eq!(snapshot.metric("total").and_then(|m| m.value_at(50)), Some(300.0));
    assert_eq!(session.stage(), &RefreshStage::Complete);

    let mut updated: Value = scenario().document().clone();
    updated["flat"][0]["value"] = json!(400.0);
    session.update_store(JsonScenario::new(updated));
    assert!(session.is_stale());

    let snapshot = session.run().unwrap();
    assert_eq!(snapshot.generation, 2);
    assert_eq!(snapshot.metric("total").and_then(|m| m.value_at(50)), Some(600.0));
}
