//! Execution context for qsoftmax
//!
//! A context owns device buffers and an ordered queue. The flow is
//! stage -> bind -> invoke -> synchronize -> read back:
//!
//! ```no_run
//! use qsoftmax_common::{DType, Tensor};
//! use qsoftmax_runtime::{ComputationDescriptor, ExecutionContext};
//!
//! # fn main() -> qsoftmax_common::Result<()> {
//! let ctx = ExecutionContext::cpu()?;
//! let input = Tensor::from_f32(vec![1.0, 2.0, 3.0], &[1, 3])?;
//! let buffer = ctx.stage_tensor(&input)?;
//!
//! let desc = ComputationDescriptor::builder(input.desc()).axis(1).build()?;
//! let handle = ctx.bind(desc)?;
//! let token = ctx.invoke(&handle, &buffer, &buffer)?;
//! ctx.synchronize(&token)?;
//!
//! let probs = ctx.read_back_tensor(&buffer)?;
//! assert_eq!(probs.dtype(), DType::F32);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod context;
pub mod descriptor;
pub mod queue;

pub use buffer::{Buffer, BufferState};
pub use context::{ContextOptions, ContextStats, ExecutableHandle, ExecutionContext};
pub use descriptor::{ComputationDescriptor, ComputationDescriptorBuilder};
pub use queue::CompletionToken;
