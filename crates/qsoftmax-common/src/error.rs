//! Error types for quantization, kernel execution, and the device runtime

use thiserror::Error;

/// Top-level error type shared by every qsoftmax crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QSoftmaxError {
    #[error("Quantization error: {0}")]
    Quantization(#[from] QuantizationError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures raised while deriving a scale or mapping values into an integer domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantizationError {
    /// Every element is zero, so no scale can be derived.
    #[error("Degenerate input: all {len} elements are zero, scale is undefined")]
    DegenerateInput { len: usize },

    #[error("Non-finite input value {value} at index {index}")]
    NonFiniteInput { index: usize, value: f32 },

    #[error("Cannot quantize an empty input")]
    EmptyInput,

    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid scale: {scale}")]
    InvalidScale { scale: f32 },
}

/// Failures raised by softmax kernels and their launch configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("Invalid axis {axis} for tensor of rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    #[error("Unsupported data type: {dtype}")]
    UnsupportedDataType { dtype: String },

    #[error("Invalid kernel arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("No available kernel provider")]
    NoProvider,
}

/// Failures raised by an execution context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Allocation of {requested} bytes failed: {reason}")]
    Allocation { requested: usize, reason: String },

    #[error("Synchronization timed out after {waited_ms} ms")]
    Timeout { waited_ms: u128 },

    #[error("Device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Buffer {buffer} is not readable in state {state}")]
    BufferNotReady { buffer: u64, state: String },

    #[error("Buffer {buffer} does not belong to this context")]
    ForeignBuffer { buffer: u64 },

    #[error("Handle was bound to a different context")]
    ForeignHandle,

    #[error("Execution queue is closed")]
    QueueClosed,

    #[error("Execution failed: {reason}")]
    Failed { reason: String },
}

/// Result type used across qsoftmax.
pub type Result<T> = std::result::Result<T, QSoftmaxError>;
