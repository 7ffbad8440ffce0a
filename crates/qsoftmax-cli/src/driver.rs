//! End-to-end pipeline: generate, quantize, stage, softmax, read back.

use crate::generator::SampleGenerator;
use qsoftmax_common::{DType, PipelineConfig, Result, Shape, Tensor, TensorDesc};
use qsoftmax_quantization::SymmetricQuantizer;
use qsoftmax_runtime::{ComputationDescriptor, ContextOptions, ContextStats, ExecutionContext};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Everything one run observed, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub device: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub axis: usize,
    pub kernel: String,
    pub in_place: bool,
    /// Generated real-valued input.
    pub usr_src_data: Vec<f32>,
    /// Largest generated value.
    pub max_usr_src_data: f32,
    /// Quantization scale; `1.0` for an f32 pipeline.
    pub scale: f32,
    /// Input after quantization, widened for display.
    pub src_data: Vec<f32>,
    /// Rescaled softmax output, widened for display.
    pub output: Vec<f32>,
    /// `output / output_scale`, i.e. the probabilities, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dequantized: Option<Vec<f32>>,
    pub stats: ContextStats,
}

/// Run the whole pipeline described by `config`.
///
/// With `dequantize`, the report also carries the output divided by the
/// output rescale.
pub fn run_pipeline(config: &PipelineConfig, dequantize: bool) -> Result<RunReport> {
    let shape = Shape::new([config.batch, config.channels])?;
    let mut generator = SampleGenerator::new(config.generator);
    let usr_src_data = generator.take_samples(shape.numel());
    let max_usr_src_data = usr_src_data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    debug!(generator = %config.generator, n = usr_src_data.len(), max = max_usr_src_data, "input generated");

    let quantizer = SymmetricQuantizer::new(config.dtype).with_rounding(config.rounding);
    let (scale, codes) = quantizer.quantize(&usr_src_data)?;
    let src = Tensor::new(codes, shape.clone())?;

    let options = ContextOptions {
        memory_limit: config.memory_limit_bytes(),
        kernel: config.kernel.clone(),
    };
    let ctx = ExecutionContext::new(config.device, options)?;

    let src_desc = TensorDesc::new(shape.clone(), config.dtype);
    let src_buffer = ctx.stage(&src.as_bytes(), &src_desc)?;

    let descriptor = ComputationDescriptor::builder(src_desc)
        .axis(config.axis)
        .dst_dtype(config.dtype)
        .output_rescale(config.output_scale)
        .rounding(config.rounding)
        .build()?;
    let handle = ctx.bind(descriptor)?;

    let dst_buffer = if config.in_place { None } else { Some(ctx.allocate(&handle.descriptor().dst())?) };
    let dst = dst_buffer.as_ref().unwrap_or(&src_buffer);

    let token = ctx.invoke(&handle, &src_buffer, dst)?;
    match config.timeout_ms {
        Some(ms) => ctx.synchronize_timeout(&token, Duration::from_millis(ms))?,
        None => ctx.synchronize(&token)?,
    }

    let output = ctx.read_back_tensor(dst)?.to_f32_vec();
    let dequantized = dequantize
        .then(|| output.iter().map(|&v| v / config.output_scale).collect::<Vec<f32>>());

    let stats = ctx.stats();
    info!(
        kernel = handle.kernel(),
        invocations = stats.invocations,
        bytes_staged = stats.bytes_staged,
        "pipeline complete"
    );

    if let Some(buffer) = dst_buffer {
        ctx.release(buffer)?;
    }
    ctx.release(src_buffer)?;

    Ok(RunReport {
        device: config.device.to_string(),
        dtype: config.dtype,
        shape: shape.dims().to_vec(),
        axis: config.axis,
        kernel: handle.kernel().to_string(),
        in_place: config.in_place,
        usr_src_data,
        max_usr_src_data,
        scale,
        src_data: src.to_f32_vec(),
        output,
        dequantized,
        stats,
    })
}
