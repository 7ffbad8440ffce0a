//! Property tests for shape arithmetic and tensor byte views.

use proptest::prelude::*;
use qsoftmax_common::{DType, Shape, Tensor, TensorDesc};

fn dims_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..6, 1..5)
}

proptest! {
    /// Splitting around any valid axis preserves the element count.
    #[test]
    fn prop_split_preserves_numel(dims in dims_strategy(), axis_seed in 0usize..16) {
        let shape = Shape::new(dims.clone()).unwrap();
        let axis = axis_seed % shape.rank();
        let (outer, len, inner) = shape.split_at_axis(axis).unwrap();
        prop_assert_eq!(outer * len * inner, shape.numel());
        prop_assert_eq!(len, dims[axis]);
    }

    /// Stride of the leading dimension times its size equals the element count.
    #[test]
    fn prop_strides_cover_tensor(dims in dims_strategy()) {
        let shape = Shape::new(dims.clone()).unwrap();
        let strides = shape.strides();
        prop_assert_eq!(strides[0] * dims[0], shape.numel());
        prop_assert_eq!(*strides.last().unwrap(), 1);
    }

    /// Byte size agrees with the byte view of a zero tensor for every dtype.
    #[test]
    fn prop_byte_size_matches_storage(dims in dims_strategy(), which in 0usize..3) {
        let desc = TensorDesc::new(Shape::new(dims).unwrap(), DType::ALL[which]);
        let t = Tensor::zeros(&desc);
        prop_assert_eq!(t.as_bytes().len(), desc.size_in_bytes().unwrap());
    }
}
