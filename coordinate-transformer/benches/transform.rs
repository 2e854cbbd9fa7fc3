//! Grid sampling and bulk transform throughput.
//!
//! Run with: cargo bench -p coordinate-transformer --bench transform

use std::hint::black_box;

use coordinate_transformer::{CoordinateTransformer, PointTransformer};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pcd_core::pointcloud::point::Point;
use projection_transform::{
    crs::{EPSG_JGD2011_JPRECT_IX, EPSG_NAD27_GEOGRAPHIC, EPSG_NAD83_GEOGRAPHIC, EPSG_WGS84_GEOGRAPHIC_3D},
    grid::{cache::ShiftGridCache, GridCell, GridExtent, ShiftGrid},
    gridshift::DatumShiftRegistry,
    GridError,
};

/// 0.1 degree grid over lng [-130, -120], lat [48, 55] with smoothly varying shifts.
fn pacific_grid() -> Result<ShiftGrid, GridError> {
    let extent = GridExtent {
        lat_origin: 48.0,
        lng_origin: -130.0,
        lat_step: 0.1,
        lng_step: 0.1,
        rows: 71,
        columns: 101,
    };
    let cells = (0..extent.rows * extent.columns)
        .map(|i| {
            let (row, column) = ((i / extent.columns) as f64, (i % extent.columns) as f64);
            GridCell {
                shift_lng: 1e-3 + column * 1e-6,
                shift_lat: -2e-3 + row * 2e-6,
                shift_height: row * 0.01,
                ..Default::default()
            }
        })
        .collect();
    ShiftGrid::new("pacific", extent, cells)
}

fn scatter(n: usize, origin: (f64, f64), span: (f64, f64)) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            Point::new(
                origin.0 + span.0 * t,
                origin.1 + span.1 * ((t * 7.3).fract()),
                i as f64 % 50.0,
            )
        })
        .collect()
}

fn bench_grid_sample(c: &mut Criterion) {
    let grid = pacific_grid().unwrap();
    let points = scatter(10_000, (-129.9, 48.1), (9.8, 6.8));

    let mut group = c.benchmark_group("grid_sample");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("bilinear", |b| {
        b.iter(|| {
            for p in &points {
                let _ = black_box(grid.sample(p.x, p.y));
            }
        })
    });
    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let cache = ShiftGridCache::new(|id: &str| match id {
        "pacific" => pacific_grid(),
        _ => Err(GridError::NotFound(id.to_string())),
    });
    let mut registry = DatumShiftRegistry::new();
    registry.register("NAD27", "NAD83", ["pacific"]);
    registry.register_aligned("WGS84", "JGD2011");
    let transformer = CoordinateTransformer::new(&cache, registry);

    let cases = [
        (
            "nad27_to_nad83",
            EPSG_NAD27_GEOGRAPHIC,
            EPSG_NAD83_GEOGRAPHIC,
            (-129.5, 48.5),
            (9.0, 6.0),
        ),
        (
            "jprect_to_wgs84",
            EPSG_JGD2011_JPRECT_IX,
            EPSG_WGS84_GEOGRAPHIC_3D,
            (-20_000.0, -20_000.0),
            (40_000.0, 40_000.0),
        ),
    ];

    let mut group = c.benchmark_group("transform_points_in_place");
    for (name, from, to, origin, span) in cases {
        let pt = PointTransformer::new(&transformer, from, to).unwrap();
        for &n in &[1_000usize, 100_000] {
            let points = scatter(n, origin, span);
            group.throughput(Throughput::Elements(n as u64));
            group.bench_with_input(BenchmarkId::new(name, n), &points, |b, points| {
                b.iter_batched(
                    || points.clone(),
                    |mut batch| pt.transform_points_in_place(&mut batch),
                    criterion::BatchSize::LargeInput,
                )
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_grid_sample, bench_transform);
criterion_main!(benches);
