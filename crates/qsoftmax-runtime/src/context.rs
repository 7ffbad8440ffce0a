//! Execution context: buffer ownership, binding, and the ordered queue.

use crate::buffer::{Buffer, BufferSlot, BufferState};
use crate::descriptor::ComputationDescriptor;
use crate::queue::{self, Command, Completion, CompletionToken, Invocation, Shared, lock};
use qsoftmax_common::{
    Device, ExecutionError, KernelError, Result, Tensor, TensorData, TensorDesc,
};
use qsoftmax_kernels::{KernelProvider, kernel_manager};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Options fixed at context creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    /// Upper bound on the bytes held by live buffers.
    pub memory_limit: Option<usize>,
    /// Force a kernel provider by name instead of automatic selection.
    pub kernel: Option<String>,
}

impl ContextOptions {
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_kernel(mut self, name: impl Into<String>) -> Self {
        self.kernel = Some(name.into());
        self
    }
}

/// A descriptor bound to one context: validated once, reusable for any
/// number of invocations. Owns no data.
#[derive(Debug, Clone)]
pub struct ExecutableHandle {
    context_id: u64,
    descriptor: ComputationDescriptor,
    kernel: &'static str,
}

impl ExecutableHandle {
    pub fn descriptor(&self) -> &ComputationDescriptor {
        &self.descriptor
    }

    /// Name of the kernel provider chosen at bind time.
    pub fn kernel(&self) -> &'static str {
        self.kernel
    }
}

/// Snapshot of context activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub invocations: u64,
    pub completed: u64,
    pub failed: u64,
    pub bytes_staged: u64,
    pub live_buffers: usize,
    pub live_bytes: usize,
}

/// Device/queue abstraction: stage buffers, bind descriptors, invoke them
/// asynchronously, and synchronize before reading results back.
///
/// Only [`Device::Cpu`] is serviceable. One worker thread executes
/// invocations in submission order; [`invoke`](Self::invoke) never blocks
/// and [`synchronize`](Self::synchronize) is the only blocking point.
/// Dropping the context drains the queue and joins the worker.
pub struct ExecutionContext {
    id: u64,
    device: Device,
    options: ContextOptions,
    shared: Arc<Shared>,
    sender: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    next_buffer: AtomicU64,
    bytes_staged: AtomicU64,
    // Serializes sequence assignment with the channel send so FIFO order
    // matches sequence order.
    submit: Mutex<()>,
}

impl ExecutionContext {
    /// Create a context on `device` and start its queue worker.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::DeviceUnavailable`] for any non-CPU device, and
    /// [`KernelError::NoProvider`] if `options.kernel` names an unknown or
    /// unavailable provider.
    pub fn new(device: Device, options: ContextOptions) -> Result<Self> {
        if !device.is_cpu() {
            warn!(%device, "requested device is not available, only cpu is supported");
            return Err(ExecutionError::DeviceUnavailable { device: device.to_string() }.into());
        }
        if let Some(name) = &options.kernel {
            kernel_manager().select_by_name(name)?;
        }

        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared::default());
        let (sender, receiver) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name(format!("qsoftmax-queue-{id}"))
            .spawn(move || queue::run_worker(id, worker_shared, receiver))
            .map_err(|e| ExecutionError::Failed {
                reason: format!("failed to spawn queue worker: {e}"),
            })?;

        info!(context = id, %device, memory_limit = ?options.memory_limit, "execution context created");
        Ok(Self {
            id,
            device,
            options,
            shared,
            sender: Some(sender),
            worker: Some(worker),
            next_buffer: AtomicU64::new(1),
            bytes_staged: AtomicU64::new(0),
            submit: Mutex::new(()),
        })
    }

    /// CPU context with default options.
    pub fn cpu() -> Result<Self> {
        Self::new(Device::Cpu, ContextOptions::default())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    // -----------------------------------------------------------------
    // Buffers
    // -----------------------------------------------------------------

    /// Copy little-endian `bytes` laid out as `desc` into a new buffer.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::Allocation`] if the length does not match the
    /// descriptor or the memory limit would be exceeded.
    pub fn stage(&self, bytes: &[u8], desc: &TensorDesc) -> Result<Buffer> {
        let expected = desc.size_in_bytes()?;
        if bytes.len() != expected {
            return Err(ExecutionError::Allocation {
                requested: bytes.len(),
                reason: format!("{desc} needs exactly {expected} bytes"),
            }
            .into());
        }
        let data = TensorData::from_bytes(desc.dtype, bytes)?;
        self.insert(desc.clone(), data)
    }

    /// Typed convenience for [`stage`](Self::stage).
    pub fn stage_tensor(&self, tensor: &Tensor) -> Result<Buffer> {
        let desc = tensor.desc();
        self.insert(desc, tensor.data().clone())
    }

    /// Create a zero-filled buffer, typically a separate destination.
    pub fn allocate(&self, desc: &TensorDesc) -> Result<Buffer> {
        let data = TensorData::zeros(desc.dtype, desc.numel());
        self.insert(desc.clone(), data)
    }

    fn insert(&self, desc: TensorDesc, data: TensorData) -> Result<Buffer> {
        let slot = BufferSlot::staged(desc.clone(), data);
        let size = slot.size_in_bytes();

        let mut buffers = lock(&self.shared.buffers);
        if let Some(limit) = self.options.memory_limit {
            let live: usize = buffers.values().map(BufferSlot::size_in_bytes).sum();
            if live.saturating_add(size) > limit {
                return Err(ExecutionError::Allocation {
                    requested: size,
                    reason: format!("memory limit of {limit} bytes reached ({live} in use)"),
                }
                .into());
            }
        }

        let id = self.next_buffer.fetch_add(1, Ordering::Relaxed);
        buffers.insert(id, slot);
        drop(buffers);

        self.bytes_staged.fetch_add(size as u64, Ordering::Relaxed);
        debug!(context = self.id, buffer = id, %desc, bytes = size, "buffer staged");
        Ok(Buffer { id, context_id: self.id, desc })
    }

    /// Current lifecycle state of `buffer`.
    pub fn buffer_state(&self, buffer: &Buffer) -> Result<BufferState> {
        self.check_owner(buffer)?;
        lock(&self.shared.buffers)
            .get(&buffer.id)
            .map(|slot| slot.state)
            .ok_or_else(|| ExecutionError::ForeignBuffer { buffer: buffer.id }.into())
    }

    /// Copy the contents of `buffer` out as little-endian bytes.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::BufferNotReady`] unless the buffer is `Staged` or
    /// `Readable`.
    pub fn read_back(&self, buffer: &Buffer) -> Result<Vec<u8>> {
        self.with_readable(buffer, |data| data.as_bytes().into_owned())
    }

    /// Typed convenience for [`read_back`](Self::read_back).
    pub fn read_back_tensor(&self, buffer: &Buffer) -> Result<Tensor> {
        let data = self.with_readable(buffer, TensorData::clone)?;
        Tensor::new(data, buffer.desc.shape.clone())
    }

    fn with_readable<T>(&self, buffer: &Buffer, f: impl FnOnce(&TensorData) -> T) -> Result<T> {
        self.check_owner(buffer)?;
        let buffers = lock(&self.shared.buffers);
        let slot = buffers
            .get(&buffer.id)
            .ok_or(ExecutionError::ForeignBuffer { buffer: buffer.id })?;
        if !slot.state.is_readable() {
            return Err(ExecutionError::BufferNotReady {
                buffer: buffer.id,
                state: slot.state.to_string(),
            }
            .into());
        }
        Ok(f(&slot.data))
    }

    /// Free `buffer`. A buffer still referenced by unsynchronized work
    /// cannot be released.
    pub fn release(&self, buffer: Buffer) -> Result<()> {
        self.check_owner(&buffer)?;
        let mut buffers = lock(&self.shared.buffers);
        match buffers.get(&buffer.id).map(|slot| slot.state) {
            None => Err(ExecutionError::ForeignBuffer { buffer: buffer.id }.into()),
            Some(BufferState::Pending) => Err(ExecutionError::BufferNotReady {
                buffer: buffer.id,
                state: BufferState::Pending.to_string(),
            }
            .into()),
            Some(_) => {
                buffers.remove(&buffer.id);
                debug!(context = self.id, buffer = buffer.id, "buffer released");
                Ok(())
            }
        }
    }

    fn check_owner(&self, buffer: &Buffer) -> Result<()> {
        if buffer.context_id != self.id {
            return Err(ExecutionError::ForeignBuffer { buffer: buffer.id }.into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Binding and invocation
    // -----------------------------------------------------------------

    /// Bind `descriptor` to this context and choose its kernel provider.
    pub fn bind(&self, descriptor: ComputationDescriptor) -> Result<ExecutableHandle> {
        descriptor.softmax_config()?;
        let provider = self.provider()?;
        debug!(
            context = self.id,
            src = %descriptor.src(),
            dst_dtype = %descriptor.dst_dtype(),
            axis = descriptor.axis(),
            kernel = provider.name(),
            "descriptor bound"
        );
        Ok(ExecutableHandle { context_id: self.id, descriptor, kernel: provider.name() })
    }

    fn provider(&self) -> Result<&'static dyn KernelProvider> {
        match &self.options.kernel {
            Some(name) => kernel_manager().select_by_name(name),
            None => kernel_manager().select_best(),
        }
    }

    /// Enqueue `handle` reading `src` and writing `dst`. Never blocks.
    ///
    /// Passing the same buffer as `src` and `dst` runs in place, which
    /// requires the destination dtype to equal the source dtype.
    ///
    /// # Errors
    ///
    /// - [`ExecutionError::ForeignHandle`] / [`ExecutionError::ForeignBuffer`]
    ///   for handles or buffers from another context.
    /// - [`KernelError::ShapeMismatch`] / [`KernelError::UnsupportedDataType`]
    ///   when a buffer does not match the bound descriptor.
    /// - [`ExecutionError::BufferNotReady`] if `src` is poisoned.
    /// - [`ExecutionError::QueueClosed`] if the worker has stopped.
    pub fn invoke(
        &self,
        handle: &ExecutableHandle,
        src: &Buffer,
        dst: &Buffer,
    ) -> Result<CompletionToken> {
        if handle.context_id != self.id {
            return Err(ExecutionError::ForeignHandle.into());
        }
        self.check_owner(src)?;
        self.check_owner(dst)?;

        let descriptor = &handle.descriptor;
        check_desc(src.desc(), descriptor.src())?;
        check_desc(dst.desc(), &descriptor.dst())?;
        if src.id == dst.id && !descriptor.supports_in_place() {
            return Err(KernelError::InvalidArguments {
                reason: format!(
                    "in-place execution needs matching dtypes, got {} -> {}",
                    descriptor.src().dtype,
                    descriptor.dst_dtype()
                ),
            }
            .into());
        }

        let config = descriptor.softmax_config()?;
        let provider = kernel_manager().select_by_name(handle.kernel)?;
        let completion = Arc::new(Completion::default());

        let _submit = lock(&self.submit);
        let (seq, previous) = {
            let mut buffers = lock(&self.shared.buffers);
            for buffer in [src, dst] {
                let state = buffers
                    .get(&buffer.id)
                    .map(|slot| slot.state)
                    .ok_or(ExecutionError::ForeignBuffer { buffer: buffer.id })?;
                if buffer.id == src.id && state == BufferState::Poisoned {
                    return Err(ExecutionError::BufferNotReady {
                        buffer: buffer.id,
                        state: state.to_string(),
                    }
                    .into());
                }
            }

            let seq = lock(&self.shared.progress).submitted + 1;
            let previous: Vec<_> = [src.id, dst.id]
                .into_iter()
                .filter_map(|id| buffers.get(&id).map(|slot| (id, slot.state, slot.last_invocation)))
                .collect();
            for id in [src.id, dst.id] {
                if let Some(slot) = buffers.get_mut(&id) {
                    slot.state = BufferState::Pending;
                    slot.last_invocation = Some(seq);
                }
            }
            (seq, previous)
        };

        let command = Command::Softmax(Invocation {
            seq,
            src: src.id,
            dst: dst.id,
            config,
            provider,
            completion: Arc::clone(&completion),
        });
        let sent = match self.sender.as_ref() {
            Some(sender) => sender.send(command).is_ok(),
            None => false,
        };
        if !sent {
            // Nothing was enqueued: put the buffers back the way they were.
            let mut buffers = lock(&self.shared.buffers);
            for (id, state, last_invocation) in previous {
                if let Some(slot) = buffers.get_mut(&id) {
                    slot.state = state;
                    slot.last_invocation = last_invocation;
                }
            }
            warn!(context = self.id, seq, "queue closed; invocation not enqueued");
            return Err(ExecutionError::QueueClosed.into());
        }
        lock(&self.shared.progress).submitted = seq;

        debug!(
            context = self.id,
            seq,
            src = src.id,
            dst = dst.id,
            in_place = src.id == dst.id,
            "invocation enqueued"
        );
        Ok(CompletionToken { seq, context_id: self.id, completion })
    }

    // -----------------------------------------------------------------
    // Synchronization
    // -----------------------------------------------------------------

    /// Block until every invocation up to and including `token` has
    /// finished, then mark the buffers they touched readable.
    ///
    /// Returns the first failure among that work that has not already been
    /// reported.
    pub fn synchronize(&self, token: &CompletionToken) -> Result<()> {
        self.sync_to(token, None)
    }

    /// [`synchronize`](Self::synchronize) with an upper bound on the wait.
    ///
    /// On timeout the work keeps running; a later synchronize can still
    /// collect it.
    pub fn synchronize_timeout(&self, token: &CompletionToken, timeout: Duration) -> Result<()> {
        self.sync_to(token, Some(timeout))
    }

    /// Synchronize everything enqueued so far.
    pub fn synchronize_all(&self) -> Result<()> {
        let seq = lock(&self.shared.progress).submitted;
        self.wait_and_settle(seq, None)
    }

    fn sync_to(&self, token: &CompletionToken, timeout: Option<Duration>) -> Result<()> {
        if token.context_id != self.id {
            return Err(ExecutionError::ForeignHandle.into());
        }
        self.wait_and_settle(token.seq, timeout)
    }

    fn wait_and_settle(&self, seq: u64, timeout: Option<Duration>) -> Result<()> {
        if !self.shared.wait_for(seq, timeout) {
            let waited_ms = timeout.map(|t| t.as_millis()).unwrap_or_default();
            warn!(context = self.id, seq, waited_ms = waited_ms as u64, "synchronize timed out");
            return Err(ExecutionError::Timeout { waited_ms }.into());
        }

        {
            let mut buffers = lock(&self.shared.buffers);
            for slot in buffers.values_mut() {
                if slot.state == BufferState::Pending
                    && slot.last_invocation.is_some_and(|last| last <= seq)
                {
                    slot.state = BufferState::Readable;
                }
            }
        }

        let first_failure = {
            let mut progress = lock(&self.shared.progress);
            let remaining = progress.failures.split_off(&(seq + 1));
            let reported = std::mem::replace(&mut progress.failures, remaining);
            reported.into_values().next()
        };
        debug!(context = self.id, seq, failed = first_failure.is_some(), "synchronized");
        first_failure.map_or(Ok(()), Err)
    }

    /// Activity counters for this context.
    pub fn stats(&self) -> ContextStats {
        let (live_buffers, live_bytes) = {
            let buffers = lock(&self.shared.buffers);
            (buffers.len(), buffers.values().map(BufferSlot::size_in_bytes).sum())
        };
        let progress = lock(&self.shared.progress);
        let stats = ContextStats {
            invocations: progress.submitted,
            completed: progress.completed,
            failed: progress.failed_total,
            bytes_staged: self.bytes_staged.load(Ordering::Relaxed),
            live_buffers,
            live_bytes,
        };
        debug!(context = self.id, ?stats, "context stats");
        stats
    }

    #[cfg(test)]
    pub(crate) fn submit_raw(&self, invocation: Invocation) -> Result<()> {
        lock(&self.shared.progress).submitted = invocation.seq;
        self.sender
            .as_ref()
            .ok_or(ExecutionError::QueueClosed)?
            .send(Command::Softmax(invocation))
            .map_err(|_| ExecutionError::QueueClosed.into())
    }
}

fn check_desc(actual: &TensorDesc, expected: &TensorDesc) -> Result<()> {
    if actual.shape != expected.shape {
        return Err(KernelError::ShapeMismatch {
            expected: expected.shape.dims().to_vec(),
            actual: actual.shape.dims().to_vec(),
        }
        .into());
    }
    if actual.dtype != expected.dtype {
        return Err(KernelError::UnsupportedDataType {
            dtype: format!("{} (expected {})", actual.dtype, expected.dtype),
        }
        .into());
    }
    Ok(())
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(context = self.id, "queue worker panicked");
            }
        }
        debug!(context = self.id, "execution context dropped");
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
