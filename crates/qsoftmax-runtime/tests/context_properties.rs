//! The execution context must agree with the direct kernel call.

use proptest::prelude::*;
use qsoftmax_common::{DType, Tensor};
use qsoftmax_kernels::softmax_tensor;
use qsoftmax_runtime::{ComputationDescriptor, ExecutionContext};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_context_matches_direct_kernel(
        rows in 1usize..8,
        cols in 1usize..16,
        axis in 0usize..2,
        dst in prop_oneof![Just(DType::F32), Just(DType::U8), Just(DType::S8)],
        seed in any::<u32>(),
    ) {
        let data: Vec<f32> = (0..rows * cols)
            .map(|i| ((i as u32).wrapping_mul(2_654_435_761).wrapping_add(seed) % 1000) as f32 / 100.0)
            .collect();
        let input = Tensor::from_f32(data, &[rows, cols]).unwrap();
        let expected = softmax_tensor(&input, axis, 127.0, dst).unwrap();

        let ctx = ExecutionContext::cpu().unwrap();
        let desc = ComputationDescriptor::builder(input.desc())
            .axis(axis)
            .dst_dtype(dst)
            .output_rescale(127.0)
            .build()
            .unwrap();
        let handle = ctx.bind(desc).unwrap();
        let src = ctx.stage_tensor(&input).unwrap();
        let out = ctx.allocate(&expected.desc()).unwrap();
        let token = ctx.invoke(&handle, &src, &out).unwrap();
        ctx.synchronize(&token).unwrap();

        prop_assert_eq!(ctx.read_back_tensor(&out).unwrap(), expected);
    }
}
