//! Multi-threaded CPU softmax kernel.
//!
//! Slice blocks are independent, so the `[axis_len, inner]` blocks of the
//! `[outer, axis_len, inner]` view are distributed over the rayon pool.
//! When there is a single block (`outer == 1`, e.g. axis 0), its `inner`
//! columns are split into tiles instead.
//! The per-block arithmetic is shared with [`softmax_cpu`](crate::softmax::softmax_cpu),
//! so both providers produce bit-identical results.

use crate::KernelProvider;
use crate::softmax::{SoftmaxConfig, softmax_block, widen_input, write_output};
use qsoftmax_common::{Result, TensorData};
use rayon::prelude::*;
use tracing::trace;

/// Rayon-backed softmax kernel, parallel over slice blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelCpuKernel;

impl ParallelCpuKernel {
    /// Fewer than this many elements are not worth distributing.
    pub const MIN_PARALLEL_ELEMENTS: usize = 1024;
}

impl KernelProvider for ParallelCpuKernel {
    fn name(&self) -> &'static str {
        "parallel-cpu"
    }

    fn is_available(&self) -> bool {
        num_cpus::get() > 1
    }

    fn softmax(
        &self,
        input: &TensorData,
        output: &mut TensorData,
        config: &SoftmaxConfig,
    ) -> Result<()> {
        config.validate_lengths(input, output)?;

        let x = widen_input(input, config.src_scale);
        let mut y = vec![0.0f32; x.len()];
        let block = config.block_len();

        let large = x.len() >= Self::MIN_PARALLEL_ELEMENTS;
        if config.outer > 1 && large {
            trace!(blocks = config.outer, block, "parallel softmax");
            y.par_chunks_exact_mut(block).zip(x.par_chunks_exact(block)).for_each(|(yb, xb)| {
                softmax_block(xb, yb, config.axis_len, config.inner, config.output_rescale);
            });
        } else if config.inner > 1 && large {
            softmax_column_tiles(&x, &mut y, config);
        } else {
            for (xb, yb) in x.chunks_exact(block).zip(y.chunks_exact_mut(block)) {
                softmax_block(xb, yb, config.axis_len, config.inner, config.output_rescale);
            }
        }

        write_output(&y, output, config.rounding);
        Ok(())
    }
}

/// Softmax of a single `[axis_len, inner]` block, parallel over column tiles.
///
/// Each tile gathers `width` columns into a contiguous `[axis_len, width]`
/// block, so the per-slice arithmetic is the same as the sequential path.
fn softmax_column_tiles(x: &[f32], y: &mut [f32], config: &SoftmaxConfig) {
    let (axis_len, inner) = (config.axis_len, config.inner);
    let width = inner.div_ceil(rayon::current_num_threads()).max(1);
    let starts: Vec<usize> = (0..inner).step_by(width).collect();
    trace!(tiles = starts.len(), width, "parallel softmax over columns");

    let tiles: Vec<(usize, Vec<f32>)> = starts
        .into_par_iter()
        .map(|start| {
            let w = width.min(inner - start);
            let xs: Vec<f32> =
                x.chunks_exact(inner).flat_map(|row| &row[start..start + w]).copied().collect();
            let mut ys = vec![0.0f32; xs.len()];
            softmax_block(&xs, &mut ys, axis_len, w, config.output_rescale);
            (start, ys)
        })
        .collect();

    for (start, ys) in tiles {
        let w = ys.len() / axis_len;
        for (row, tile_row) in y.chunks_exact_mut(inner).zip(ys.chunks_exact(w)) {
            row[start..start + w].copy_from_slice(tile_row);
        }
    }
}
