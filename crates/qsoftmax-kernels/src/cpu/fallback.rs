//! Fallback CPU kernel implementation
//!
//! Naive but correct softmax that works on any architecture. It processes
//! one slice block at a time on the calling thread and serves as the
//! reference the other providers are checked against.

use crate::KernelProvider;
use crate::softmax::{SoftmaxConfig, softmax_cpu};
use qsoftmax_common::{Result, TensorData};

/// Fallback CPU kernel that works on any architecture
///
/// Always available; selected when no parallel provider is usable or when
/// forced by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackKernel;

impl KernelProvider for FallbackKernel {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn softmax(
        &self,
        input: &TensorData,
        output: &mut TensorData,
        config: &SoftmaxConfig,
    ) -> Result<()> {
        softmax_cpu(input, output, config)
    }
}
