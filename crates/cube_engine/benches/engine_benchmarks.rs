//! Criterion benchmarks for the registry engines.
//!
//! Benchmarks cover:
//! - Source computation over the wind preset with varying project life
//! - Metric computation against precomputed sources
//! - A full staged refresh

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cube_engine::lookup::SourceLookup;
use cube_engine::metric::{compute_metrics_data, PercentileInfo};
use cube_engine::presets::wind;
use cube_engine::refresh::CubeSession;
use cube_engine::scenario::JsonScenario;
use cube_engine::source::compute_source_data;

fn percentile_grid(step: u32) -> Vec<u32> {
    (1..100).step_by(step as usize).collect()
}

/// Benchmark source computation.
fn bench_sources(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_source_data");
    let registry = wind::source_registry();

    for (years, step) in [(20, 40), (30, 10), (30, 1)] {
        let percentiles = percentile_grid(step);
        let scenario = JsonScenario::new(wind::sample_scenario(&percentiles, years));
        let label = format!("{}y_{}p", years, percentiles.len());

        group.bench_with_input(BenchmarkId::new("wind", &label), &scenario, |b, scenario| {
            b.iter(|| compute_source_data(black_box(&registry), &percentiles, scenario, None));
        });
    }

    group.finish();
}

/// Benchmark metric computation with sources already in place.
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_metrics_data");
    let registry = wind::metric_registry();

    for step in [40, 10, 1] {
        let percentiles = percentile_grid(step);
        let scenario = JsonScenario::new(wind::sample_scenario(&percentiles, 30));
        let sources = compute_source_data(&wind::source_registry(), &percentiles, &scenario, None);
        let info = PercentileInfo::new(percentiles.clone());

        group.bench_function(BenchmarkId::new("wind", percentiles.len()), |b| {
            let lookup = SourceLookup::new(&sources);
            b.iter(|| compute_metrics_data(black_box(&registry), &info, &scenario, &lookup));
        });
    }

    group.finish();
}

/// Benchmark a full refresh, including the static registry checks.
fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh");
    group.sample_size(30);

    let percentiles = percentile_grid(10);
    let mut session = CubeSession::new(
        JsonScenario::new(wind::sample_scenario(&percentiles, 25)),
        wind::source_registry(),
        wind::metric_registry(),
        PercentileInfo::new(percentiles),
    )
    .with_required_paths(wind::required_paths());

    group.bench_function("wind_25y", |b| {
        b.iter(|| {
            session.request_refresh(true).ok();
            black_box(session.run().map(|s| s.generation).ok())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sources, bench_metrics, bench_refresh);
criterion_main!(benches);
