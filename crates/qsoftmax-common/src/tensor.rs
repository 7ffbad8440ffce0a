//! Shapes, tensor descriptors, and typed host tensors

use crate::{DType, KernelError, QSoftmaxError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Row-major tensor shape with the last dimension contiguous.
///
/// A shape always has at least one dimension and every dimension is
/// positive, so the element count is never zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Result<Self> {
        let dims = dims.into();
        if dims.is_empty() {
            return Err(QSoftmaxError::Validation("shape must have at least one dimension".into()));
        }
        if let Some(pos) = dims.iter().position(|&d| d == 0) {
            return Err(QSoftmaxError::Validation(format!(
                "dimension {pos} of shape {dims:?} is zero"
            )));
        }
        dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).ok_or_else(|| {
            QSoftmaxError::Validation(format!("element count of shape {dims:?} overflows usize"))
        })?;
        Ok(Self { dims })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. Checked for overflow at construction.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Split the shape around `axis` into `(outer, axis_len, inner)`.
    ///
    /// Element `(o, k, i)` of the split lives at `(o * axis_len + k) * inner + i`,
    /// so each `(o, i)` pair identifies one reduction slice with stride `inner`.
    pub fn split_at_axis(&self, axis: usize) -> Result<(usize, usize, usize)> {
        if axis >= self.rank() {
            return Err(KernelError::InvalidAxis { axis, rank: self.rank() }.into());
        }
        let outer = self.dims[..axis].iter().product();
        let inner = self.dims[axis + 1..].iter().product();
        Ok((outer, self.dims[axis], inner))
    }
}

impl TryFrom<Vec<usize>> for Shape {
    type Error = QSoftmaxError;

    fn try_from(dims: Vec<usize>) -> Result<Self> {
        Self::new(dims)
    }
}

impl From<Shape> for Vec<usize> {
    fn from(shape: Shape) -> Self {
        shape.dims
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", dims.join("x"))
    }
}

/// Shape and element type of a tensor without its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    pub shape: Shape,
    pub dtype: DType,
}

impl TensorDesc {
    pub fn new(shape: Shape, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Bytes needed to hold the tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the byte count would overflow `usize`.
    pub fn size_in_bytes(&self) -> Result<usize> {
        self.numel().checked_mul(self.dtype.size_in_bytes()).ok_or_else(|| {
            KernelError::InvalidArguments {
                reason: format!(
                    "buffer size overflow: {} elements of {}",
                    self.numel(),
                    self.dtype
                ),
            }
            .into()
        })
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shape, self.dtype)
    }
}

/// Typed element storage, one variant per [`DType`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    U8(Vec<u8>),
    S8(Vec<i8>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::U8(_) => DType::U8,
            Self::S8(_) => DType::S8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::S8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => Self::F32(vec![0.0; len]),
            DType::U8 => Self::U8(vec![0; len]),
            DType::S8 => Self::S8(vec![0; len]),
        }
    }

    /// Widen every element to `f32` without applying any scale.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            Self::F32(v) => v.clone(),
            Self::U8(v) => v.iter().map(|&x| f32::from(x)).collect(),
            Self::S8(v) => v.iter().map(|&x| f32::from(x)).collect(),
        }
    }

    /// Raw bytes in little-endian order; borrowed on little-endian targets.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::F32(v) if cfg!(target_endian = "big") => {
                Cow::Owned(v.iter().flat_map(|x| x.to_le_bytes()).collect())
            }
            Self::F32(v) => Cow::Borrowed(bytemuck::cast_slice(v)),
            Self::U8(v) => Cow::Borrowed(v),
            Self::S8(v) => Cow::Borrowed(bytemuck::cast_slice(v)),
        }
    }

    /// Decode little-endian `bytes` as elements of `dtype`.
    ///
    /// # Errors
    ///
    /// Returns an error when the byte length is not a multiple of the
    /// element size.
    pub fn from_bytes(dtype: DType, bytes: &[u8]) -> Result<Self> {
        let elem = dtype.size_in_bytes();
        if bytes.len() % elem != 0 {
            return Err(KernelError::InvalidArguments {
                reason: format!(
                    "{} bytes is not a whole number of {dtype} elements",
                    bytes.len()
                ),
            }
            .into());
        }
        Ok(match dtype {
            DType::F32 => Self::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes(bytemuck::pod_read_unaligned(c)))
                    .collect(),
            ),
            DType::U8 => Self::U8(bytes.to_vec()),
            DType::S8 => Self::S8(bytemuck::cast_slice(bytes).to_vec()),
        })
    }
}

/// Host tensor: typed data plus a shape whose element count matches it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: TensorData,
    shape: Shape,
}

impl Tensor {
    pub fn new(data: TensorData, shape: Shape) -> Result<Self> {
        if data.len() != shape.numel() {
            return Err(KernelError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                actual: vec![data.len()],
            }
            .into());
        }
        Ok(Self { data, shape })
    }

    pub fn from_f32(data: Vec<f32>, dims: &[usize]) -> Result<Self> {
        Self::new(TensorData::F32(data), Shape::new(dims)?)
    }

    pub fn from_u8(data: Vec<u8>, dims: &[usize]) -> Result<Self> {
        Self::new(TensorData::U8(data), Shape::new(dims)?)
    }

    pub fn from_s8(data: Vec<i8>, dims: &[usize]) -> Result<Self> {
        Self::new(TensorData::S8(data), Shape::new(dims)?)
    }

    pub fn zeros(desc: &TensorDesc) -> Self {
        Self { data: TensorData::zeros(desc.dtype, desc.numel()), shape: desc.shape.clone() }
    }

    pub fn from_bytes(desc: &TensorDesc, bytes: &[u8]) -> Result<Self> {
        Self::new(TensorData::from_bytes(desc.dtype, bytes)?, desc.shape.clone())
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn desc(&self) -> TensorDesc {
        TensorDesc::new(self.shape.clone(), self.dtype())
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut TensorData {
        &mut self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            TensorData::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_s8(&self) -> Option<&[i8]> {
        match &self.data {
            TensorData::S8(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.to_f32_vec()
    }

    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        self.data.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_rejects_empty_and_zero_dims() {
        assert!(Shape::new(Vec::<usize>::new()).is_err());
        assert!(Shape::new([3, 0]).is_err());
        assert!(Shape::new([usize::MAX, 2]).is_err());
    }

    #[test]
    fn shape_strides_are_row_major() {
        let s = Shape::new([2, 3, 4]).unwrap();
        assert_eq!(s.strides(), vec![12, 4, 1]);
        assert_eq!(s.numel(), 24);
    }

    #[test]
    fn split_at_axis_decomposes_shape() {
        let s = Shape::new([2, 3, 4]).unwrap();
        assert_eq!(s.split_at_axis(0).unwrap(), (1, 2, 12));
        assert_eq!(s.split_at_axis(1).unwrap(), (2, 3, 4));
        assert_eq!(s.split_at_axis(2).unwrap(), (6, 4, 1));
    }

    #[test]
    fn split_at_axis_rejects_out_of_range() {
        let s = Shape::new([3, 10]).unwrap();
        let err = s.split_at_axis(5).unwrap_err();
        assert_eq!(err, QSoftmaxError::Kernel(KernelError::InvalidAxis { axis: 5, rank: 2 }));
    }

    #[test]
    fn tensor_checks_element_count() {
        let err = Tensor::from_f32(vec![1.0; 5], &[2, 3]).unwrap_err();
        assert!(matches!(err, QSoftmaxError::Kernel(KernelError::ShapeMismatch { .. })));
    }

    #[test]
    fn tensor_bytes_round_trip() {
        let t = Tensor::from_f32(vec![1.0, -2.5, 3.25, 0.0], &[2, 2]).unwrap();
        let back = Tensor::from_bytes(&t.desc(), &t.as_bytes()).unwrap();
        assert_eq!(back, t);

        let s = Tensor::from_s8(vec![-128, -1, 0, 127], &[4]).unwrap();
        assert_eq!(&*s.as_bytes(), &[0x80, 0xff, 0x00, 0x7f]);
        assert_eq!(Tensor::from_bytes(&s.desc(), &s.as_bytes()).unwrap(), s);
    }

    #[test]
    fn f32_bytes_are_little_endian() {
        let t = Tensor::from_f32(vec![1.0, -2.0], &[2]).unwrap();
        assert_eq!(&*t.as_bytes(), &[0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0xc0]);
        let decoded = TensorData::from_bytes(DType::F32, &[0x00, 0x00, 0x40, 0x40]).unwrap();
        assert_eq!(decoded, TensorData::F32(vec![3.0]));
    }

    #[test]
    fn from_bytes_rejects_partial_elements() {
        assert!(TensorData::from_bytes(DType::F32, &[0, 0, 0]).is_err());
    }

    #[test]
    fn size_in_bytes_accounts_for_dtype() {
        let shape = Shape::new([3, 10]).unwrap();
        assert_eq!(TensorDesc::new(shape.clone(), DType::F32).size_in_bytes().unwrap(), 120);
        assert_eq!(TensorDesc::new(shape, DType::U8).size_in_bytes().unwrap(), 30);
    }
}
