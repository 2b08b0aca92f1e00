//! Criterion benchmarks for bitonic sort backends vs the CPU baseline.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

use gpu_bitonic_sort::{cpu_sort, HostDevice, SortEngine};

/// Generate random test data of given size
fn generate_random_data(size: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Benchmark the CPU baselines
fn bench_cpu_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("CPU Sort");

    for size_exp in [10, 12, 14, 16, 18, 20] {
        let size = 1usize << size_exp;
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("pdqsort", size), &size, |b, &size| {
            b.iter_batched(
                || generate_random_data(size),
                |mut data| {
                    cpu_sort::sort_unstable(black_box(&mut data));
                    data
                },
                criterion::BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("rayon", size), &size, |b, &size| {
            b.iter_batched(
                || generate_random_data(size),
                |mut data| {
                    cpu_sort::parallel_sort(black_box(&mut data));
                    data
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

/// Benchmark the bitonic network on host lanes
fn bench_host_bitonic(c: &mut Criterion) {
    let mut group = c.benchmark_group("Bitonic Sort (host)");
    let engine = SortEngine::with_device(HostDevice::new());

    for size_exp in [10, 12, 14, 16] {
        let size = 1usize << size_exp;
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || generate_random_data(size),
                |data| engine.sort_batch_blocking(black_box(&data)),
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

/// Benchmark the bitonic network on the wgpu backend, if an adapter exists
#[cfg(feature = "webgpu")]
fn bench_wgpu_bitonic(c: &mut Criterion) {
    let device = match gpu_bitonic_sort::WgpuDevice::new() {
        Ok(device) => device,
        Err(e) => {
            println!("Skipping WebGPU benchmark: {e}");
            return;
        }
    };
    let engine = SortEngine::with_device(device);
    let mut group = c.benchmark_group("Bitonic Sort (webgpu)");

    for size_exp in [10, 12, 14, 16, 18, 20] {
        let size = 1usize << size_exp;
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || generate_random_data(size),
                |data| engine.sort_batch_blocking(black_box(&data)),
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

#[cfg(not(feature = "webgpu"))]
fn bench_wgpu_bitonic(_c: &mut Criterion) {}

criterion_group!(
    benches,
    bench_cpu_sort,
    bench_host_bitonic,
    bench_wgpu_bitonic
);
criterion_main!(benches);
