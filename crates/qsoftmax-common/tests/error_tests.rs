//! Error taxonomy and message formatting for qsoftmax-common

use qsoftmax_common::*;

#[test]
fn top_level_variants_wrap_sources() {
    let q: QSoftmaxError = QuantizationError::DegenerateInput { len: 30 }.into();
    assert!(matches!(q, QSoftmaxError::Quantization(QuantizationError::DegenerateInput { .. })));

    let k: QSoftmaxError = KernelError::InvalidAxis { axis: 5, rank: 2 }.into();
    assert!(matches!(k, QSoftmaxError::Kernel(KernelError::InvalidAxis { axis: 5, rank: 2 })));

    let e: QSoftmaxError = ExecutionError::Timeout { waited_ms: 10 }.into();
    assert!(matches!(e, QSoftmaxError::Execution(ExecutionError::Timeout { .. })));
}

#[test]
fn messages_are_stable() {
    insta::assert_snapshot!(
        QSoftmaxError::from(QuantizationError::DegenerateInput { len: 30 }).to_string(),
        @"Quantization error: Degenerate input: all 30 elements are zero, scale is undefined"
    );
    insta::assert_snapshot!(
        QSoftmaxError::from(KernelError::InvalidAxis { axis: 5, rank: 2 }).to_string(),
        @"Kernel error: Invalid axis 5 for tensor of rank 2"
    );
    insta::assert_snapshot!(
        KernelError::ShapeMismatch { expected: vec![3, 10], actual: vec![10, 3] }.to_string(),
        @"Shape mismatch: expected [3, 10], got [10, 3]"
    );
    insta::assert_snapshot!(
        ExecutionError::BufferNotReady { buffer: 4, state: "pending".into() }.to_string(),
        @"Buffer 4 is not readable in state pending"
    );
}

#[test]
fn kernel_error_variants() {
    assert_eq!(KernelError::NoProvider.to_string(), "No available kernel provider");
    assert_eq!(
        KernelError::UnsupportedDataType { dtype: "bf16".into() }.to_string(),
        "Unsupported data type: bf16"
    );
    assert_eq!(
        KernelError::InvalidArguments { reason: "rescale must be positive".into() }.to_string(),
        "Invalid kernel arguments: rescale must be positive"
    );
}

#[test]
fn execution_error_variants() {
    assert_eq!(
        ExecutionError::Allocation { requested: 64, reason: "limit".into() }.to_string(),
        "Allocation of 64 bytes failed: limit"
    );
    assert_eq!(
        ExecutionError::DeviceUnavailable { device: "cuda:0".into() }.to_string(),
        "Device unavailable: cuda:0"
    );
    assert_eq!(ExecutionError::QueueClosed.to_string(), "Execution queue is closed");
}

#[test]
fn config_error_converts_to_top_level() {
    let err: QSoftmaxError = ConfigError::Validation("batch and channels must be >= 1".into()).into();
    assert_eq!(
        err.to_string(),
        "Configuration error: validation error: batch and channels must be >= 1"
    );
}
