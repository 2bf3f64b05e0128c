//! Benchmarks for the HAND pipeline stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drainhand_algorithms::hydrology::{
    condition_dem, drainage_mask, flow_accumulation, flow_direction, hand, ConditionParams,
    DrainageThreshold,
};
use drainhand_algorithms::interpolation::{fill_nan, GapFillParams};
use drainhand_algorithms::pipeline::{compute_hand, HandConfig};
use drainhand_core::{GeoTransform, Raster};

/// Valley draining towards row 0 with small noise that leaves pits to fill
fn create_valley_dem(size: usize) -> Raster<f64> {
    let mut dem = Raster::new(size, size);
    dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    let center = size as f64 / 2.0;
    for row in 0..size {
        for col in 0..size {
            let cross = (col as f64 - center).abs() * 0.3;
            let noise = ((row * 7 + col * 13) % 17) as f64 * 0.05;
            dem.set(row, col, row as f64 * 0.1 + cross + noise).unwrap();
        }
    }
    dem
}

fn bench_condition(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/condition_dem");
    for size in [128, 256, 512, 1024] {
        let dem = create_valley_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| condition_dem(black_box(&dem), &ConditionParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_flow_direction(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/flow_direction");
    for size in [256, 512, 1024, 2048] {
        let cond = condition_dem(&create_valley_dem(size), &ConditionParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| flow_direction(black_box(&cond.dem), Some(&cond.gradient)).unwrap())
        });
    }
    group.finish();
}

fn bench_flow_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/flow_accumulation");
    for size in [256, 512, 1024, 2048] {
        let cond = condition_dem(&create_valley_dem(size), &ConditionParams::default()).unwrap();
        let fdir = flow_direction(&cond.dem, Some(&cond.gradient)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| flow_accumulation(black_box(&fdir)).unwrap())
        });
    }
    group.finish();
}

fn bench_hand(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/hand");
    for size in [256, 512, 1024] {
        let cond = condition_dem(&create_valley_dem(size), &ConditionParams::default()).unwrap();
        let fdir = flow_direction(&cond.dem, Some(&cond.gradient)).unwrap();
        let acc = flow_accumulation(&fdir).unwrap();
        let drainage = drainage_mask(&acc, DrainageThreshold::Fixed(100)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| hand(black_box(&cond.dem), &fdir, &drainage.mask).unwrap())
        });
    }
    group.finish();
}

fn bench_fill_nan(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpolation/fill_nan");
    for size in [128, 256, 512] {
        let mut grid = create_valley_dem(size);
        for row in size / 4..size / 2 {
            for col in size / 4..size / 2 {
                grid.set(row, col, f64::NAN).unwrap();
            }
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| fill_nan(black_box(&grid), &GapFillParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/compute_hand");
    group.sample_size(10);
    for size in [256, 512] {
        let dem = create_valley_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| compute_hand(black_box(&dem), None, &HandConfig::default()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_condition,
    bench_flow_direction,
    bench_flow_accumulation,
    bench_hand,
    bench_fill_nan,
    bench_pipeline,
);
criterion_main!(benches);
