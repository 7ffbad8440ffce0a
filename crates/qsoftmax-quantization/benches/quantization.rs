//! Benchmarks for symmetric quantization
//!
//! Covers the sequential path and the rayon path above the parallel
//! threshold, for both integer destinations.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use qsoftmax_common::DType;
use qsoftmax_quantization::{SymmetricQuantizer, dequantize};
use std::hint::black_box;

fn benchmark_input(size: usize) -> Vec<f32> {
    (0..size).map(|i| (i as f32 - size as f32 / 2.0) / (size as f32 / 4.0)).collect()
}

fn bench_quantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantize");

    for size in [1024, 4096, 16384, 262_144] {
        let data = benchmark_input(size);
        group.throughput(Throughput::Elements(size as u64));

        for dtype in [DType::U8, DType::S8] {
            let quantizer = SymmetricQuantizer::new(dtype);
            group.bench_with_input(BenchmarkId::new(dtype.as_str(), size), &data, |b, data| {
                b.iter(|| black_box(quantizer.quantize(black_box(data)).unwrap()))
            });
        }
    }

    group.finish();
}

fn bench_dequantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("dequantize");

    for size in [4096, 262_144] {
        let quantizer = SymmetricQuantizer::new(DType::S8);
        let (scale, codes) = quantizer.quantize(&benchmark_input(size)).unwrap();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("s8", size), &codes, |b, codes| {
            b.iter(|| black_box(dequantize(black_box(codes), scale).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_quantize, bench_dequantize);
criterion_main!(benches);
