//! Element type tags and rounding conventions

use crate::{KernelError, QSoftmaxError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element data type carried by every tensor and buffer.
///
/// The set is closed: 32-bit float, unsigned 8-bit, and signed 8-bit.
/// Integer tags know their representable range so that quantization and
/// the softmax output conversion can saturate instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[default]
    F32,
    U8,
    #[serde(alias = "i8")]
    S8,
}

impl DType {
    pub const ALL: [DType; 3] = [DType::F32, DType::U8, DType::S8];

    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::U8 | Self::S8 => 1,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Self::U8 | Self::S8)
    }

    /// Smallest representable value, as `f32`.
    pub const fn min_value(self) -> f32 {
        match self {
            Self::F32 => f32::MIN,
            Self::U8 => u8::MIN as f32,
            Self::S8 => i8::MIN as f32,
        }
    }

    /// Largest representable value, as `f32`.
    ///
    /// This is the `dtype_max` used for scale selection.
    pub const fn max_value(self) -> f32 {
        match self {
            Self::F32 => f32::MAX,
            Self::U8 => u8::MAX as f32,
            Self::S8 => i8::MAX as f32,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::U8 => "u8",
            Self::S8 => "s8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DType {
    type Err = QSoftmaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float" | "float32" => Ok(Self::F32),
            "u8" | "uint8" => Ok(Self::U8),
            "s8" | "i8" | "int8" => Ok(Self::S8),
            other => Err(KernelError::UnsupportedDataType { dtype: other.to_string() }.into()),
        }
    }
}

/// Rounding convention applied when a real value lands exactly between two
/// integers during quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingMode {
    /// Ties go to the even neighbour (`2.5 -> 2`, `3.5 -> 4`).
    #[default]
    HalfToEven,
    /// Ties go away from zero (`2.5 -> 3`, `-2.5 -> -3`).
    HalfAwayFromZero,
}

impl RoundingMode {
    #[inline]
    pub fn round(self, x: f32) -> f32 {
        match self {
            Self::HalfToEven => x.round_ties_even(),
            Self::HalfAwayFromZero => x.round(),
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HalfToEven => write!(f, "half-to-even"),
            Self::HalfAwayFromZero => write!(f, "half-away-from-zero"),
        }
    }
}

impl std::str::FromStr for RoundingMode {
    type Err = QSoftmaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "half-to-even" | "even" | "bankers" => Ok(Self::HalfToEven),
            "half-away-from-zero" | "away" | "half-up" => Ok(Self::HalfAwayFromZero),
            other => Err(QSoftmaxError::Validation(format!("unknown rounding mode: {other}"))),
        }
    }
}
