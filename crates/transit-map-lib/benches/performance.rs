//! Performance benchmarks for transit-map-lib
//!
//! Run with: cargo bench --package transit-map-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Coord, LineString};
use transit_map_lib::normalize::{normalize_feeder, parse_feature_collection};
use transit_map_lib::trim::try_trim;
use transit_map_lib::{
    LoadedData, RenderConfig, SceneSurface, SystemId, SystemInputs, TransitMap, load_systems,
};

/// Feeder feature collection with one line per route and a stop every tenth point
fn generate_feeders(routes: usize, points_per_route: usize) -> String {
    let features: Vec<serde_json::Value> = (0..routes)
        .flat_map(|r| {
            let code = if r % 2 == 0 { format!("AN-{r:02}") } else { format!("AS-{r:02}") };
            let coords: Vec<[f64; 2]> = (0..points_per_route)
                .map(|i| {
                    let t = i as f64 / points_per_route as f64;
                    [-77.10 + r as f64 * 0.01 + (t * 30.0).cos() * 0.001, -12.20 + t * 0.3]
                })
                .collect();
            let stops: Vec<serde_json::Value> = coords
                .iter()
                .step_by(10)
                .map(|c| {
                    serde_json::json!({
                        "type": "Feature",
                        "properties": {"ref": code, "name": "Paradero"},
                        "geometry": {"type": "Point", "coordinates": c},
                    })
                })
                .collect();
            std::iter::once(serde_json::json!({
                "type": "Feature",
                "properties": {"ref": code},
                "geometry": {"type": "LineString", "coordinates": coords},
            }))
            .chain(stops)
        })
        .collect();
    serde_json::json!({"type": "FeatureCollection", "features": features}).to_string()
}

/// Straight backbone of `n` points
fn generate_backbone(n: usize) -> Vec<LineString<f64>> {
    let coords = (0..n)
        .map(|i| Coord {
            x: -77.05,
            y: -11.90 - i as f64 * 0.0005,
        })
        .collect();
    vec![LineString::new(coords)]
}

// ============================================================================
// Core Benchmarks
// ============================================================================

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    group.sample_size(20);

    for routes in [10, 100] {
        let json = generate_feeders(routes, 500);
        group.throughput(Throughput::Elements((routes * 500) as u64));
        group.bench_with_input(BenchmarkId::new("feeders", routes), &json, |b, json| {
            b.iter(|| {
                let fc = parse_feature_collection(json).unwrap();
                normalize_feeder(&fc)
            });
        });
    }

    group.finish();
}

fn bench_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("trim");

    for points in [1_000, 10_000] {
        let backbone = generate_backbone(points);
        let start = Coord {
            x: -77.0501,
            y: -11.90 - (points / 4) as f64 * 0.0005,
        };
        let end = Coord {
            x: -77.0499,
            y: -11.90 - (points * 3 / 4) as f64 * 0.0005,
        };
        group.throughput(Throughput::Elements(points as u64));
        group.bench_with_input(BenchmarkId::new("backbone", points), &backbone, |b, backbone| {
            b.iter(|| try_trim(backbone, start, end));
        });
    }

    group.finish();
}

fn bench_toggle(c: &mut Criterion) {
    let mut group = c.benchmark_group("toggle");
    group.sample_size(20);

    let data = load_systems(&SystemInputs {
        feeders: Some(generate_feeders(100, 500)),
        ..SystemInputs::default()
    });

    group.bench_function("select_then_clear_100_feeders", |b| {
        b.iter_batched(
            || new_map(data.clone()),
            |mut map| {
                map.select_all();
                map.clear_all();
                map
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.bench_function("sync_tri", |b| {
        let mut map = new_map(data.clone());
        map.select_all();
        b.iter(|| map.sync_tri(SystemId::Feeder));
    });

    group.finish();
}

fn new_map(data: LoadedData) -> TransitMap<SceneSurface> {
    struct NoSource;
    impl transit_map_lib::GeometrySource for NoSource {
        fn fetch(
            &self,
            definition: &transit_map_lib::TraditionalDefinition,
        ) -> futures::future::BoxFuture<'static, transit_map_lib::Result<transit_map_lib::TraditionalGeometry>>
        {
            let id = definition.id.clone();
            Box::pin(async move { Err(transit_map_lib::MapError::MissingData(id)) })
        }
    }
    TransitMap::new(
        SceneSurface::new(),
        RenderConfig::default(),
        data,
        std::sync::Arc::new(NoSource),
    )
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_normalize, bench_trim, bench_toggle);

criterion_main!(benches);
