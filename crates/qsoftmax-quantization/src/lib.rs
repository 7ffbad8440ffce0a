//! Quantization for the qsoftmax pipeline
//!
//! This crate maps floating-point activations into a fixed-width integer
//! domain and back:
//! - Scale selection from the tensor's peak absolute value
//! - Saturating, explicitly rounded float-to-integer mapping (u8 / s8)
//! - Identity pass-through for f32 destinations
//! - Dequantization and error metrics for verification

use qsoftmax_common::{DType, Result, RoundingMode, Tensor};

pub mod symmetric;
pub mod utils;

pub use symmetric::{SymmetricQuantizer, dequantize};
pub use utils::{calculate_mse, calculate_scale, calculate_snr, dequantize_value, quantize_value};

/// A tensor in a reduced-precision domain plus the scale that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    pub tensor: Tensor,
    /// `quantized = round(real * scale)`; `1.0` for f32 pass-through.
    pub scale: f32,
}

impl QuantizedTensor {
    pub fn dtype(&self) -> DType {
        self.tensor.dtype()
    }

    /// One quantization step in the real domain.
    pub fn step(&self) -> f32 {
        1.0 / self.scale
    }

    pub fn dequantize(&self) -> Result<Vec<f32>> {
        dequantize(self.tensor.data(), self.scale)
    }
}

/// Trait for quantizer implementations
pub trait Quantizer: Send + Sync {
    /// Quantize an f32 tensor, preserving its shape.
    fn quantize_tensor(&self, tensor: &Tensor) -> Result<QuantizedTensor>;

    /// Map a quantized tensor back to f32.
    fn dequantize_tensor(&self, tensor: &QuantizedTensor) -> Result<Tensor>;

    /// Destination element type.
    fn dtype(&self) -> DType;
}

/// Build the quantizer for a destination type.
pub fn quantizer_for(dtype: DType, rounding: RoundingMode) -> Box<dyn Quantizer> {
    Box::new(SymmetricQuantizer::new(dtype).with_rounding(rounding))
}

/// Check that a quantize → dequantize round trip stays within one step of
/// the original for every element.
pub fn validate_round_trip(original: &[f32], dtype: DType, rounding: RoundingMode) -> Result<bool> {
    let quantizer = SymmetricQuantizer::new(dtype).with_rounding(rounding);
    let (scale, data) = quantizer.quantize(original)?;
    let restored = dequantize(&data, scale)?;
    let step = 1.0 / scale;
    Ok(original.iter().zip(&restored).all(|(&x, &y)| (x - y).abs() <= step))
}
