//! Compute device identifiers

use crate::QSoftmaxError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device an execution context is constructed for.
///
/// Chosen by the caller before the context exists; the runtime decides
/// whether it can service the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_cpu(&self) -> bool {
        matches!(self, Self::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = QSoftmaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "cpu" => return Ok(Self::Cpu),
            "cuda" | "gpu" => return Ok(Self::Cuda(0)),
            _ => {}
        }
        let Some(ordinal) = lower.strip_prefix("cuda:").or_else(|| lower.strip_prefix("gpu:"))
        else {
            return Err(QSoftmaxError::Validation(format!("unknown device: {s}")));
        };
        ordinal
            .parse::<usize>()
            .map(Self::Cuda)
            .map_err(|_| QSoftmaxError::Validation(format!("invalid device ordinal: {s}")))
    }
}

impl TryFrom<String> for Device {
    type Error = QSoftmaxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("GPU".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for d in [Device::Cpu, Device::Cuda(2)] {
            assert_eq!(d.to_string().parse::<Device>().unwrap(), d);
        }
    }
}
