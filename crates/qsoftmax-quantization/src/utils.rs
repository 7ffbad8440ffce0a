//! Utility functions for quantization operations

use qsoftmax_common::{DType, QuantizationError, Result, RoundingMode};

/// Reject empty or non-finite input.
pub fn validate_input(data: &[f32]) -> Result<()> {
    if data.is_empty() {
        return Err(QuantizationError::EmptyInput.into());
    }
    if let Some((index, &value)) = data.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        return Err(QuantizationError::NonFiniteInput { index, value }.into());
    }
    Ok(())
}

/// Largest absolute value in `data`.
pub fn peak_abs(data: &[f32]) -> f32 {
    data.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
}

/// Calculate the per-tensor scale mapping `data` into `dtype`.
///
/// `scale = dtype_max / max(|x|)`. For `F32` the mapping is the identity and
/// the scale is `1.0`.
///
/// # Errors
///
/// [`QuantizationError::DegenerateInput`] when every element is zero and the
/// destination is an integer type; empty or non-finite input is rejected too.
pub fn calculate_scale(data: &[f32], dtype: DType) -> Result<f32> {
    validate_input(data)?;
    if !dtype.is_integer() {
        return Ok(1.0);
    }

    let peak = peak_abs(data);
    if peak == 0.0 {
        return Err(QuantizationError::DegenerateInput { len: data.len() }.into());
    }

    let scale = dtype.max_value() / peak;
    // A subnormal peak can push the scale to infinity.
    if !scale.is_finite() {
        return Err(QuantizationError::InvalidScale { scale }.into());
    }
    Ok(scale)
}

/// Round `value` and saturate it into the range of `dtype`.
///
/// Never wraps: out-of-range values pin to the nearest bound.
#[inline]
pub fn saturate(value: f32, dtype: DType, rounding: RoundingMode) -> f32 {
    if !dtype.is_integer() {
        return value;
    }
    rounding.round(value).clamp(dtype.min_value(), dtype.max_value())
}

/// Quantize a single value into `dtype`, returned widened to `f32`.
///
/// `round(value * scale)` saturated to the destination range; the identity
/// for `F32`.
#[inline]
pub fn quantize_value(value: f32, scale: f32, dtype: DType, rounding: RoundingMode) -> f32 {
    saturate(value * scale, dtype, rounding)
}

/// Quantize a single value to the unsigned 8-bit domain.
#[inline]
pub fn quantize_u8(value: f32, scale: f32, rounding: RoundingMode) -> u8 {
    quantize_value(value, scale, DType::U8, rounding) as u8
}

/// Quantize a single value to the signed 8-bit domain.
#[inline]
pub fn quantize_s8(value: f32, scale: f32, rounding: RoundingMode) -> i8 {
    quantize_value(value, scale, DType::S8, rounding) as i8
}

/// Dequantize a single value: the exact inverse mapping `q / scale`.
#[inline]
pub fn dequantize_value(quantized: f32, scale: f32) -> f32 {
    quantized / scale
}

/// Calculate mean squared error between two sequences.
pub fn calculate_mse(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(QuantizationError::LengthMismatch { expected: a.len(), actual: b.len() }.into());
    }
    if a.is_empty() {
        return Ok(0.0);
    }

    let mse = a.iter().zip(b.iter()).map(|(&x, &y)| (x - y).powi(2)).sum::<f32>() / a.len() as f32;

    Ok(mse)
}

/// Calculate signal-to-noise ratio in decibels.
pub fn calculate_snr(original: &[f32], reconstructed: &[f32]) -> Result<f32> {
    let noise_power = calculate_mse(original, reconstructed)?;
    if noise_power == 0.0 {
        return Ok(f32::INFINITY);
    }
    let signal_power = original.iter().map(|&x| x.powi(2)).sum::<f32>() / original.len() as f32;

    Ok(10.0 * (signal_power / noise_power).log10())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsoftmax_common::QSoftmaxError;

    #[test]
    fn test_scale_from_peak_abs() {
        let data = vec![1.0, -4.0, 3.0, 2.0];
        assert!((calculate_scale(&data, DType::S8).unwrap() - 127.0 / 4.0).abs() < 1e-6);
        assert!((calculate_scale(&data, DType::U8).unwrap() - 255.0 / 4.0).abs() < 1e-6);
        assert_eq!(calculate_scale(&data, DType::F32).unwrap(), 1.0);
    }

    #[test]
    fn test_scale_rejects_all_zero() {
        let err = calculate_scale(&[0.0; 6], DType::U8).unwrap_err();
        assert_eq!(err, QSoftmaxError::Quantization(QuantizationError::DegenerateInput { len: 6 }));
        // Float destinations never need a scale.
        assert_eq!(calculate_scale(&[0.0; 6], DType::F32).unwrap(), 1.0);
    }

    #[test]
    fn test_scale_rejects_non_finite() {
        let err = calculate_scale(&[1.0, f32::NAN], DType::S8).unwrap_err();
        assert!(matches!(
            err,
            QSoftmaxError::Quantization(QuantizationError::NonFiniteInput { index: 1, .. })
        ));
        assert!(calculate_scale(&[], DType::S8).is_err());
    }

    #[test]
    fn test_quantize_value_per_dtype() {
        let r = RoundingMode::HalfToEven;
        assert_eq!(quantize_value(0.5, 255.0, DType::U8, r), 128.0);
        assert_eq!(quantize_value(-0.5, 255.0, DType::U8, r), 0.0);
        assert_eq!(quantize_value(-2.0, 127.0, DType::S8, r), -128.0);
        assert_eq!(quantize_value(0.3, 1.0, DType::F32, r), 0.3);
        let q = quantize_value(0.75, 10.0, DType::S8, r);
        assert_eq!(dequantize_value(q, 10.0), 0.8);
    }

    #[test]
    fn test_saturation_never_wraps() {
        assert_eq!(quantize_u8(-3.0, 1.0, RoundingMode::HalfToEven), 0);
        assert_eq!(quantize_u8(300.0, 1.0, RoundingMode::HalfToEven), 255);
        assert_eq!(quantize_s8(-200.0, 1.0, RoundingMode::HalfToEven), -128);
        assert_eq!(quantize_s8(200.0, 1.0, RoundingMode::HalfToEven), 127);
    }

    #[test]
    fn test_tie_rounding_is_pinned() {
        assert_eq!(quantize_s8(0.5, 5.0, RoundingMode::HalfToEven), 2);
        assert_eq!(quantize_s8(0.5, 5.0, RoundingMode::HalfAwayFromZero), 3);
        assert_eq!(quantize_s8(-0.5, 5.0, RoundingMode::HalfToEven), -2);
        assert_eq!(quantize_s8(-0.5, 5.0, RoundingMode::HalfAwayFromZero), -3);
        assert_eq!(quantize_u8(0.5, 7.0, RoundingMode::HalfToEven), 4);
        assert_eq!(quantize_u8(0.5, 7.0, RoundingMode::HalfAwayFromZero), 4);
    }

    #[test]
    fn test_mse_and_snr() {
        assert_eq!(calculate_mse(&[1.0, 2.0], &[1.0, 2.0]).unwrap(), 0.0);
        assert!((calculate_mse(&[1.0, 2.0], &[2.0, 4.0]).unwrap() - 2.5).abs() < 1e-6);
        assert!(calculate_mse(&[1.0], &[1.0, 2.0]).is_err());
        assert_eq!(calculate_snr(&[1.0, 2.0], &[1.0, 2.0]).unwrap(), f32::INFINITY);
        // signal 1.0, noise 0.01 -> 20 dB
        let snr = calculate_snr(&[1.0, -1.0], &[1.1, -1.1]).unwrap();
        assert!((snr - 20.0).abs() < 1e-3, "snr = {snr}");
    }
}
