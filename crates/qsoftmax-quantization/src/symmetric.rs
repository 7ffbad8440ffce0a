//! Symmetric per-tensor quantization
//!
//! One scale per tensor, derived from the peak absolute value and the
//! destination type's maximum. Zero maps to zero, values are rounded with the
//! configured [`RoundingMode`] and saturated into the destination range.

use crate::utils::{calculate_scale, dequantize_value, quantize_s8, quantize_u8, validate_input};
use crate::{QuantizedTensor, Quantizer};
use qsoftmax_common::{
    DType, KernelError, QuantizationError, Result, RoundingMode, Tensor, TensorData,
};
use rayon::prelude::*;
use tracing::debug;

/// Inputs shorter than this are mapped sequentially.
const PARALLEL_THRESHOLD: usize = 4096;

/// Symmetric per-tensor quantizer for a fixed destination type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricQuantizer {
    dtype: DType,
    rounding: RoundingMode,
}

impl SymmetricQuantizer {
    pub fn new(dtype: DType) -> Self {
        Self { dtype, rounding: RoundingMode::default() }
    }

    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn rounding(&self) -> RoundingMode {
        self.rounding
    }

    /// Derive a scale from `data` and map every element with it.
    ///
    /// For an `F32` destination this is a copy and the reported scale is `1.0`.
    pub fn quantize(&self, data: &[f32]) -> Result<(f32, TensorData)> {
        let scale = calculate_scale(data, self.dtype)?;
        debug!(dtype = %self.dtype, len = data.len(), scale, "derived quantization scale");
        let mapped = self.map_with_scale(data, scale);
        Ok((scale, mapped))
    }

    /// Map `data` with a caller-supplied scale.
    ///
    /// # Errors
    ///
    /// Rejects empty or non-finite data and non-positive scales.
    pub fn quantize_with_scale(&self, data: &[f32], scale: f32) -> Result<TensorData> {
        validate_input(data)?;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(QuantizationError::InvalidScale { scale }.into());
        }
        Ok(self.map_with_scale(data, scale))
    }

    fn map_with_scale(&self, data: &[f32], scale: f32) -> TensorData {
        let rounding = self.rounding;
        let parallel = data.len() >= PARALLEL_THRESHOLD;
        match self.dtype {
            DType::F32 => TensorData::F32(data.to_vec()),
            DType::U8 if parallel => {
                TensorData::U8(data.par_iter().map(|&x| quantize_u8(x, scale, rounding)).collect())
            }
            DType::U8 => {
                TensorData::U8(data.iter().map(|&x| quantize_u8(x, scale, rounding)).collect())
            }
            DType::S8 if parallel => {
                TensorData::S8(data.par_iter().map(|&x| quantize_s8(x, scale, rounding)).collect())
            }
            DType::S8 => {
                TensorData::S8(data.iter().map(|&x| quantize_s8(x, scale, rounding)).collect())
            }
        }
    }
}

impl Default for SymmetricQuantizer {
    fn default() -> Self {
        Self::new(DType::U8)
    }
}

impl Quantizer for SymmetricQuantizer {
    fn quantize_tensor(&self, tensor: &Tensor) -> Result<QuantizedTensor> {
        let Some(data) = tensor.as_f32() else {
            return Err(KernelError::UnsupportedDataType {
                dtype: format!("{} (quantizer input must be f32)", tensor.dtype()),
            }
            .into());
        };
        let (scale, mapped) = self.quantize(data)?;
        let tensor = Tensor::new(mapped, tensor.shape().clone())?;
        Ok(QuantizedTensor { tensor, scale })
    }

    fn dequantize_tensor(&self, quantized: &QuantizedTensor) -> Result<Tensor> {
        let values = dequantize(quantized.tensor.data(), quantized.scale)?;
        Tensor::new(TensorData::F32(values), quantized.tensor.shape().clone())
    }

    fn dtype(&self) -> DType {
        self.dtype
    }
}

/// Map quantized elements back to reals with `q / scale`.
///
/// Used for display and verification only.
pub fn dequantize(data: &TensorData, scale: f32) -> Result<Vec<f32>> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(QuantizationError::InvalidScale { scale }.into());
    }
    Ok(match data {
        TensorData::F32(v) if scale == 1.0 => v.clone(),
        other => other.to_f32_vec().into_iter().map(|q| dequantize_value(q, scale)).collect(),
    })
}
