//! `run`: execute the quantize -> softmax pipeline once.

use crate::driver::{RunReport, run_pipeline};
use crate::output::{OutputFormat, emit, render_text};
use anyhow::{Context, Result};
use clap::Args;
use qsoftmax_common::{DType, Device, GeneratorKind, PipelineConfig, RoundingMode};

/// Pipeline flags; each one overrides the configuration file and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct RunCommand {
    /// Device to execute on (cpu, cuda, cuda:N)
    #[arg(short, long, value_name = "DEVICE")]
    pub device: Option<Device>,

    /// Element type the input is quantized to (f32, u8, s8)
    #[arg(short = 't', long, value_name = "DTYPE")]
    pub dtype: Option<DType>,

    /// Number of rows
    #[arg(short, long, value_name = "N")]
    pub batch: Option<usize>,

    /// Number of channels per row
    #[arg(long, value_name = "N")]
    pub channels: Option<usize>,

    /// Softmax reduction axis
    #[arg(short, long, value_name = "AXIS")]
    pub axis: Option<usize>,

    /// Factor applied to the softmax probabilities
    #[arg(long, value_name = "SCALE")]
    pub output_scale: Option<f32>,

    /// Rounding for integer outputs (half-to-even, half-away-from-zero)
    #[arg(long, value_name = "MODE")]
    pub rounding: Option<RoundingMode>,

    /// Input sequence (cosine, ramp, zeros)
    #[arg(short, long, value_name = "KIND")]
    pub generator: Option<GeneratorKind>,

    /// Write the result to a separate buffer instead of over the input
    #[arg(long)]
    pub out_of_place: bool,

    /// Also print the output divided by the output scale
    #[arg(long)]
    pub dequantize: bool,

    /// Fail if synchronization takes longer than this
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Limit on bytes held by the execution context
    #[arg(long, value_name = "MB")]
    pub memory_limit_mb: Option<u64>,

    /// Force a kernel provider by name (parallel-cpu, fallback)
    #[arg(long, value_name = "NAME")]
    pub kernel: Option<String>,

    /// Output format (text, json) [default: text]
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,
}

impl RunCommand {
    /// Combine with flags given before the `run` subcommand; flags on
    /// `self` take precedence.
    pub fn layered_over(&self, outer: &RunCommand) -> RunCommand {
        RunCommand {
            device: self.device.or(outer.device),
            dtype: self.dtype.or(outer.dtype),
            batch: self.batch.or(outer.batch),
            channels: self.channels.or(outer.channels),
            axis: self.axis.or(outer.axis),
            output_scale: self.output_scale.or(outer.output_scale),
            rounding: self.rounding.or(outer.rounding),
            generator: self.generator.or(outer.generator),
            out_of_place: self.out_of_place || outer.out_of_place,
            dequantize: self.dequantize || outer.dequantize,
            timeout_ms: self.timeout_ms.or(outer.timeout_ms),
            memory_limit_mb: self.memory_limit_mb.or(outer.memory_limit_mb),
            kernel: self.kernel.clone().or_else(|| outer.kernel.clone()),
            format: self.format.or(outer.format),
        }
    }

    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(dtype) = self.dtype {
            config.dtype = dtype;
        }
        if let Some(batch) = self.batch {
            config.batch = batch;
        }
        if let Some(channels) = self.channels {
            config.channels = channels;
        }
        if let Some(axis) = self.axis {
            config.axis = axis;
        }
        if let Some(scale) = self.output_scale {
            config.output_scale = scale;
        }
        if let Some(rounding) = self.rounding {
            config.rounding = rounding;
        }
        if let Some(generator) = self.generator {
            config.generator = generator;
        }
        if self.out_of_place {
            config.in_place = false;
        }
        if self.timeout_ms.is_some() {
            config.timeout_ms = self.timeout_ms;
        }
        if self.memory_limit_mb.is_some() {
            config.memory_limit_mb = self.memory_limit_mb;
        }
        if let Some(kernel) = &self.kernel {
            config.kernel = Some(kernel.clone());
        }
    }

    pub fn execute(&self, base: &PipelineConfig) -> Result<()> {
        let mut config = base.clone();
        self.apply(&mut config);
        config.validate().context("Invalid pipeline configuration")?;

        let report: RunReport = run_pipeline(&config, self.dequantize).with_context(|| {
            format!(
                "softmax pipeline failed ({} {}x{} on {})",
                config.dtype, config.batch, config.channels, config.device
            )
        })?;
        emit(self.format.unwrap_or_default(), &report, render_text)
    }
}
