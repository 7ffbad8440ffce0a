//! Process exit codes, one per failure class.

use qsoftmax_common::{ConfigError, QSoftmaxError};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_QUANTIZATION: i32 = 3;
pub const EXIT_KERNEL: i32 = 4;
pub const EXIT_EXECUTION: i32 = 5;

/// Map an error chain to its exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<QSoftmaxError>() {
        Some(QSoftmaxError::Config(_) | QSoftmaxError::Validation(_)) => EXIT_CONFIG,
        Some(QSoftmaxError::Quantization(_)) => EXIT_QUANTIZATION,
        Some(QSoftmaxError::Kernel(_)) => EXIT_KERNEL,
        Some(QSoftmaxError::Execution(_)) => EXIT_EXECUTION,
        None => EXIT_GENERIC_FAIL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use qsoftmax_common::{ExecutionError, QuantizationError};

    #[test]
    fn codes_survive_context() {
        let err: anyhow::Result<()> =
            Err(QSoftmaxError::from(QuantizationError::DegenerateInput { len: 30 }))
                .context("quantizing input");
        assert_eq!(exit_code_for(&err.unwrap_err()), EXIT_QUANTIZATION);

        let err = anyhow::Error::from(QSoftmaxError::from(ExecutionError::QueueClosed));
        assert_eq!(exit_code_for(&err), EXIT_EXECUTION);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), EXIT_GENERIC_FAIL);
    }
}
