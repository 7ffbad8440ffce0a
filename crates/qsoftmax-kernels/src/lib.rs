//! Softmax compute kernels for qsoftmax

use qsoftmax_common::{DType, KernelError, Result, Tensor, TensorData};
use std::sync::OnceLock;
use tracing::{debug, error, info};

pub mod cpu;
pub mod softmax;

pub use cpu::{FallbackKernel, ParallelCpuKernel};
pub use softmax::{SoftmaxConfig, softmax_cpu};

/// Kernel provider trait
pub trait KernelProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_available(&self) -> bool;

    /// Softmax of `input` into `output` as described by `config`.
    ///
    /// `output` may have a different element type than `input`.
    fn softmax(
        &self,
        input: &TensorData,
        output: &mut TensorData,
        config: &SoftmaxConfig,
    ) -> Result<()>;

    /// Softmax that overwrites its own input.
    ///
    /// The source is snapshotted before the first write, so slices never
    /// observe partially written neighbours.
    fn softmax_in_place(&self, data: &mut TensorData, config: &SoftmaxConfig) -> Result<()> {
        let input = data.clone();
        self.softmax(&input, data, config)
    }
}

/// Kernel manager for selecting optimal kernels with cached selection
pub struct KernelManager {
    providers: Vec<Box<dyn KernelProvider>>,
    selected: OnceLock<usize>,
}

impl KernelManager {
    pub fn new() -> Self {
        // Ordered by preference; the fallback stays last and is always available.
        let providers: Vec<Box<dyn KernelProvider>> =
            vec![Box::new(ParallelCpuKernel), Box::new(FallbackKernel)];

        Self { providers, selected: OnceLock::new() }
    }

    /// Select the best available kernel provider with caching
    pub fn select_best(&self) -> Result<&dyn KernelProvider> {
        let selected_idx = self.selected.get_or_init(|| {
            for (i, provider) in self.providers.iter().enumerate() {
                if provider.is_available() {
                    info!("Selected kernel provider: {}", provider.name());
                    return i;
                }
            }
            error!("No available kernel provider found");
            self.providers.len() - 1
        });

        self.providers
            .get(*selected_idx)
            .map(|p| p.as_ref())
            .ok_or_else(|| KernelError::NoProvider.into())
    }

    /// Look up an available provider by name, bypassing automatic selection.
    pub fn select_by_name(&self, name: &str) -> Result<&dyn KernelProvider> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.name() == name && p.is_available())
            .ok_or(KernelError::NoProvider)?;
        debug!("Forced kernel provider: {}", provider.name());
        Ok(provider.as_ref())
    }

    /// Get the name of the currently selected kernel provider
    pub fn selected_provider_name(&self) -> Option<&'static str> {
        self.selected.get().and_then(|&idx| self.providers.get(idx)).map(|p| p.name())
    }

    /// List all available kernel providers
    pub fn list_available_providers(&self) -> Vec<&'static str> {
        self.providers.iter().filter(|p| p.is_available()).map(|p| p.name()).collect()
    }

    /// Force reselection of kernel provider (for testing)
    #[cfg(test)]
    pub fn reset_selection(&mut self) {
        self.selected = OnceLock::new();
    }
}

impl Default for KernelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide manager used by the tensor-level entry points.
pub fn kernel_manager() -> &'static KernelManager {
    static MANAGER: OnceLock<KernelManager> = OnceLock::new();
    MANAGER.get_or_init(KernelManager::new)
}

/// Softmax of `input` along `axis` into `output`, with the best provider.
///
/// `output` must have the same shape as `input`; its element type selects
/// the destination domain.
///
/// # Errors
///
/// [`KernelError::ShapeMismatch`] for differing shapes,
/// [`KernelError::InvalidAxis`] for an out-of-range axis, and
/// [`KernelError::InvalidArguments`] for a non-positive rescale.
pub fn softmax_forward(
    input: &Tensor,
    output: &mut Tensor,
    axis: usize,
    output_rescale: f32,
) -> Result<()> {
    if input.shape() != output.shape() {
        return Err(KernelError::ShapeMismatch {
            expected: input.dims().to_vec(),
            actual: output.dims().to_vec(),
        }
        .into());
    }
    let config = SoftmaxConfig::for_shape(input.shape(), axis)?.with_output_rescale(output_rescale)?;
    kernel_manager().select_best()?.softmax(input.data(), output.data_mut(), &config)
}

/// Allocate an output of `dst_dtype` and run [`softmax_forward`] into it.
pub fn softmax_tensor(
    input: &Tensor,
    axis: usize,
    output_rescale: f32,
    dst_dtype: DType,
) -> Result<Tensor> {
    let desc = qsoftmax_common::TensorDesc::new(input.shape().clone(), dst_dtype);
    let mut output = Tensor::zeros(&desc);
    softmax_forward(input, &mut output, axis, output_rescale)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_always_listed() {
        let manager = KernelManager::new();
        assert!(manager.list_available_providers().contains(&"fallback"));
    }

    #[test]
    fn test_selection_is_cached() {
        let mut manager = KernelManager::new();
        assert!(manager.selected_provider_name().is_none());
        let first = manager.select_best().unwrap().name();
        assert_eq!(manager.selected_provider_name(), Some(first));
        assert_eq!(manager.select_best().unwrap().name(), first);
        manager.reset_selection();
        assert!(manager.selected_provider_name().is_none());
    }

    #[test]
    fn test_select_by_name() {
        let manager = KernelManager::new();
        assert_eq!(manager.select_by_name("fallback").unwrap().name(), "fallback");
        assert!(manager.select_by_name("cuda").is_err());
    }

    #[test]
    fn test_in_place_matches_out_of_place() {
        let config = SoftmaxConfig::for_shape(&qsoftmax_common::Shape::new([2, 3]).unwrap(), 1)
            .unwrap()
            .with_output_rescale(127.0)
            .unwrap();
        let input = TensorData::S8(vec![10, 20, 30, -5, 0, 5]);
        let mut out = TensorData::zeros(DType::S8, 6);
        FallbackKernel.softmax(&input, &mut out, &config).unwrap();

        let mut data = input.clone();
        FallbackKernel.softmax_in_place(&mut data, &config).unwrap();
        assert_eq!(data, out);
    }
}
