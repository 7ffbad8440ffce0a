//! Context-owned buffers and their lifecycle.

use qsoftmax_common::{TensorData, TensorDesc};
use std::fmt;

/// Lifecycle of a buffer inside an execution context.
///
/// ```text
/// Staged ──invoke──▶ Pending ──synchronize──▶ Readable
///                       │                         │
///                       └──failed invocation──▶ Poisoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Filled by the host and never touched by an invocation.
    Staged,
    /// Referenced by an enqueued invocation that has not been synchronized.
    Pending,
    /// Every invocation touching the buffer has been synchronized.
    Readable,
    /// An invocation touching the buffer failed; contents are undefined.
    Poisoned,
}

impl BufferState {
    /// Whether the host may copy the contents out.
    pub fn is_readable(self) -> bool {
        matches!(self, Self::Staged | Self::Readable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Pending => "pending",
            Self::Readable => "readable",
            Self::Poisoned => "poisoned",
        }
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to device-resident storage.
///
/// The storage itself stays inside the owning [`ExecutionContext`](crate::ExecutionContext);
/// the handle carries only its identity and descriptor.
/// [`release`](crate::ExecutionContext::release) consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Buffer {
    pub(crate) id: u64,
    pub(crate) context_id: u64,
    pub(crate) desc: TensorDesc,
}

impl Buffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }
}

/// Storage record kept by the context for each live buffer.
#[derive(Debug)]
pub(crate) struct BufferSlot {
    pub desc: TensorDesc,
    pub data: TensorData,
    pub state: BufferState,
    /// Sequence number of the last invocation that touched the buffer.
    pub last_invocation: Option<u64>,
}

impl BufferSlot {
    pub fn staged(desc: TensorDesc, data: TensorData) -> Self {
        Self { desc, data, state: BufferState::Staged, last_invocation: None }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len() * self.desc.dtype.size_in_bytes()
    }
}
