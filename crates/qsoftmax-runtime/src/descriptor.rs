//! Immutable description of one softmax computation.

use qsoftmax_common::{DType, Result, RoundingMode, TensorDesc};
use qsoftmax_kernels::SoftmaxConfig;

/// What to compute: softmax of a `src`-shaped tensor along `axis`, written
/// as `dst_dtype` after multiplying the probabilities by `output_rescale`.
///
/// Built through [`ComputationDescriptor::builder`], which validates the
/// axis and factors up front so binding never sees an inconsistent value.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationDescriptor {
    axis: usize,
    src: TensorDesc,
    dst_dtype: DType,
    output_rescale: f32,
    src_scale: f32,
    rounding: RoundingMode,
}

impl ComputationDescriptor {
    /// Start a descriptor for `src`. Defaults: axis 0, destination dtype
    /// equal to the source dtype, unit rescale and source scale.
    pub fn builder(src: TensorDesc) -> ComputationDescriptorBuilder {
        ComputationDescriptorBuilder {
            axis: 0,
            dst_dtype: src.dtype,
            src,
            output_rescale: 1.0,
            src_scale: 1.0,
            rounding: RoundingMode::default(),
        }
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn src(&self) -> &TensorDesc {
        &self.src
    }

    /// Descriptor the destination buffer must match.
    pub fn dst(&self) -> TensorDesc {
        TensorDesc::new(self.src.shape.clone(), self.dst_dtype)
    }

    pub fn dst_dtype(&self) -> DType {
        self.dst_dtype
    }

    pub fn output_rescale(&self) -> f32 {
        self.output_rescale
    }

    pub fn src_scale(&self) -> f32 {
        self.src_scale
    }

    pub fn rounding(&self) -> RoundingMode {
        self.rounding
    }

    /// Whether source and destination share an element type, which is the
    /// precondition for in-place execution.
    pub fn supports_in_place(&self) -> bool {
        self.src.dtype == self.dst_dtype
    }

    /// Kernel launch configuration for this computation.
    pub fn softmax_config(&self) -> Result<SoftmaxConfig> {
        Ok(SoftmaxConfig::for_shape(&self.src.shape, self.axis)?
            .with_output_rescale(self.output_rescale)?
            .with_src_scale(self.src_scale)?
            .with_rounding(self.rounding))
    }
}

/// Builder for [`ComputationDescriptor`].
#[derive(Debug, Clone)]
pub struct ComputationDescriptorBuilder {
    axis: usize,
    src: TensorDesc,
    dst_dtype: DType,
    output_rescale: f32,
    src_scale: f32,
    rounding: RoundingMode,
}

impl ComputationDescriptorBuilder {
    pub fn axis(mut self, axis: usize) -> Self {
        self.axis = axis;
        self
    }

    pub fn dst_dtype(mut self, dtype: DType) -> Self {
        self.dst_dtype = dtype;
        self
    }

    pub fn output_rescale(mut self, rescale: f32) -> Self {
        self.output_rescale = rescale;
        self
    }

    pub fn src_scale(mut self, scale: f32) -> Self {
        self.src_scale = scale;
        self
    }

    pub fn rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    /// Validate and freeze the descriptor.
    ///
    /// # Errors
    ///
    /// `InvalidAxis` for an axis outside the source rank and
    /// `InvalidArguments` for a non-positive or non-finite factor.
    pub fn build(self) -> Result<ComputationDescriptor> {
        let desc = ComputationDescriptor {
            axis: self.axis,
            src: self.src,
            dst_dtype: self.dst_dtype,
            output_rescale: self.output_rescale,
            src_scale: self.src_scale,
            rounding: self.rounding,
        };
        desc.softmax_config()?;
        Ok(desc)
    }
}
