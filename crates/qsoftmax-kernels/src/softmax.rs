//! Numerically stable softmax over one axis of a row-major tensor.
//!
//! # Kernel strategy
//!
//! The tensor is viewed as `[outer, axis_len, inner]` around the reduction
//! axis. Every `(o, i)` pair is one independent slice of `axis_len` elements
//! with stride `inner`. Each slice uses the three-pass stable algorithm:
//!
//! 1. **Slice max**: `m = max(x)`, preventing overflow in the exponential.
//! 2. **Shifted exp + sum**: `e = exp(x - m)`, `s = sum(e)` accumulated in f64.
//! 3. **Normalise + rescale**: `out = (e / s) * output_rescale`, then rounded
//!    and saturated into the destination element type.
//!
//! Within one `[axis_len, inner]` block the passes walk rows of `inner`
//! contiguous elements, so the last-axis case (`inner == 1`) and the
//! leading-axis case share the same loop.

use qsoftmax_common::{DType, KernelError, Result, RoundingMode, Shape, TensorData};
use qsoftmax_quantization::utils::saturate;

// ---------------------------------------------------------------------------
// Launch configuration
// ---------------------------------------------------------------------------

/// Launch configuration for the softmax kernels.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxConfig {
    /// Reduction axis in the original shape.
    pub axis: usize,
    /// Product of the dimensions before `axis`.
    pub outer: usize,
    /// Size of the reduction axis.
    pub axis_len: usize,
    /// Product of the dimensions after `axis`; the slice stride.
    pub inner: usize,
    /// Factor applied to the probabilities before the output conversion.
    pub output_rescale: f32,
    /// Source dequantization factor: the kernel reads `x = q / src_scale`.
    pub src_scale: f32,
    /// Rounding used when the destination is an integer type.
    pub rounding: RoundingMode,
}

impl SoftmaxConfig {
    /// Create a configuration for `shape` reduced along `axis`, with unit
    /// rescale and source scale.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidAxis`] if `axis >= shape.rank()`.
    pub fn for_shape(shape: &Shape, axis: usize) -> Result<Self> {
        let (outer, axis_len, inner) = shape.split_at_axis(axis)?;
        Ok(Self {
            axis,
            outer,
            axis_len,
            inner,
            output_rescale: 1.0,
            src_scale: 1.0,
            rounding: RoundingMode::default(),
        })
    }

    /// Override the output rescale (default `1.0`).
    ///
    /// # Errors
    ///
    /// Returns an error if `rescale` is not positive and finite.
    pub fn with_output_rescale(mut self, rescale: f32) -> Result<Self> {
        if !rescale.is_finite() || rescale <= 0.0 {
            return Err(KernelError::InvalidArguments {
                reason: format!("output rescale must be positive and finite, got {rescale}"),
            }
            .into());
        }
        self.output_rescale = rescale;
        Ok(self)
    }

    /// Override the source dequantization factor (default `1.0`).
    pub fn with_src_scale(mut self, scale: f32) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(KernelError::InvalidArguments {
                reason: format!("source scale must be positive and finite, got {scale}"),
            }
            .into());
        }
        self.src_scale = scale;
        Ok(self)
    }

    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn numel(&self) -> usize {
        self.outer * self.axis_len * self.inner
    }

    /// Elements in one `[axis_len, inner]` block.
    pub fn block_len(&self) -> usize {
        self.axis_len * self.inner
    }

    /// Number of independent reduction slices.
    pub fn num_slices(&self) -> usize {
        self.outer * self.inner
    }

    /// Check that `input` and `output` both hold exactly `numel` elements.
    pub fn validate_lengths(&self, input: &TensorData, output: &TensorData) -> Result<()> {
        let expected = self.numel();
        for len in [input.len(), output.len()] {
            if len != expected {
                return Err(
                    KernelError::ShapeMismatch { expected: vec![expected], actual: vec![len] }.into()
                );
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared building blocks
// ---------------------------------------------------------------------------

/// Widen `input` to f32 and apply the source dequantization factor.
pub fn widen_input(input: &TensorData, src_scale: f32) -> Vec<f32> {
    let mut values = input.to_f32_vec();
    #[allow(clippy::float_cmp)]
    if src_scale != 1.0 {
        let inv = 1.0 / src_scale;
        for v in &mut values {
            *v *= inv;
        }
    }
    values
}

/// Softmax over every slice of one `[axis_len, inner]` block.
///
/// `x` and `y` are the block's input and output; `y` receives the rescaled
/// probabilities in f32.
pub fn softmax_block(x: &[f32], y: &mut [f32], axis_len: usize, inner: usize, rescale: f32) {
    debug_assert_eq!(x.len(), axis_len * inner);
    debug_assert_eq!(y.len(), axis_len * inner);

    // Pass 1: per-slice max
    let mut max = vec![f32::NEG_INFINITY; inner];
    for row in x.chunks_exact(inner) {
        for (m, &v) in max.iter_mut().zip(row) {
            *m = m.max(v);
        }
    }

    // Pass 2: shifted exp + accumulate sum
    let mut sum = vec![0.0f64; inner];
    for (row_in, row_out) in x.chunks_exact(inner).zip(y.chunks_exact_mut(inner)) {
        for (((out, &v), &m), s) in row_out.iter_mut().zip(row_in).zip(&max).zip(sum.iter_mut()) {
            let e = (v - m).exp();
            *out = e;
            *s += f64::from(e);
        }
    }

    // Pass 3: normalise and rescale. The max element contributes exp(0) = 1,
    // so every sum of finite input is >= 1.
    let factors: Vec<f64> = sum.iter().map(|&s| f64::from(rescale) / s).collect();
    for row in y.chunks_exact_mut(inner) {
        for (out, &f) in row.iter_mut().zip(&factors) {
            *out = (f64::from(*out) * f) as f32;
        }
    }
}

/// Convert rescaled probabilities into the destination element type.
pub fn write_output(probs: &[f32], output: &mut TensorData, rounding: RoundingMode) {
    match output {
        TensorData::F32(out) => out.copy_from_slice(probs),
        TensorData::U8(out) => {
            for (o, &p) in out.iter_mut().zip(probs) {
                *o = saturate(p, DType::U8, rounding) as u8;
            }
        }
        TensorData::S8(out) => {
            for (o, &p) in out.iter_mut().zip(probs) {
                *o = saturate(p, DType::S8, rounding) as i8;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CPU reference
// ---------------------------------------------------------------------------

/// Sequential reference softmax.
///
/// # Errors
///
/// Returns [`KernelError::ShapeMismatch`] if either buffer does not hold
/// `config.numel()` elements.
pub fn softmax_cpu(input: &TensorData, output: &mut TensorData, config: &SoftmaxConfig) -> Result<()> {
    config.validate_lengths(input, output)?;

    let x = widen_input(input, config.src_scale);
    let mut y = vec![0.0f32; x.len()];
    let block = config.block_len();
    for (xb, yb) in x.chunks_exact(block).zip(y.chunks_exact_mut(block)) {
        softmax_block(xb, yb, config.axis_len, config.inner, config.output_rescale);
    }
    write_output(&y, output, config.rounding);
    Ok(())
}
