//! Criterion benchmarks for the softmax providers.
//!
//! Compares the sequential fallback against the rayon provider over the
//! last axis and the leading axis, for f32 and u8 destinations.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use qsoftmax_common::{DType, Shape, TensorData};
use qsoftmax_kernels::{FallbackKernel, KernelProvider, ParallelCpuKernel, SoftmaxConfig};
use std::hint::black_box;

fn cosine_input(len: usize) -> TensorData {
    TensorData::F32((0..len).map(|i| (i as f32 / 10.0).cos()).collect())
}

fn bench_softmax(c: &mut Criterion) {
    let providers: [&dyn KernelProvider; 2] = [&FallbackKernel, &ParallelCpuKernel];
    let mut group = c.benchmark_group("softmax");

    for (rows, cols) in [(3, 10), (64, 1000), (512, 4096)] {
        let shape = Shape::new([rows, cols]).expect("valid shape");
        let input = cosine_input(rows * cols);
        group.throughput(Throughput::Elements((rows * cols) as u64));

        for axis in [1, 0] {
            for dtype in [DType::F32, DType::U8] {
                let config = SoftmaxConfig::for_shape(&shape, axis)
                    .and_then(|c| c.with_output_rescale(127.0))
                    .expect("valid config");
                for provider in providers {
                    let id = format!("{}/axis{axis}/{dtype}", provider.name());
                    group.bench_with_input(
                        BenchmarkId::new(id, format!("{rows}x{cols}")),
                        &input,
                        |b, input| {
                            let mut output = TensorData::zeros(dtype, rows * cols);
                            b.iter(|| {
                                provider
                                    .softmax(black_box(input), &mut output, &config)
                                    .expect("softmax");
                            });
                        },
                    );
                }
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_softmax);
criterion_main!(benches);
