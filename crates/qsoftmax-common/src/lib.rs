//! Common types, errors, and configuration for quantized softmax inference
//!
//! This crate provides the foundational data model shared by the quantizer,
//! the softmax kernels, and the execution runtime: element type tags, shapes,
//! typed tensors, device identifiers, the error taxonomy, and the layered
//! configuration used by the driver.

pub mod config;
pub mod device;
pub mod error;
pub mod tensor;
pub mod types;

pub use config::*;
pub use device::Device;
pub use error::*;
pub use tensor::*;
pub use types::*;
