//! Ordered execution queue backed by a single worker thread.
//!
//! Commands are sent over an mpsc channel and executed strictly in
//! submission order. Each invocation carries a [`Completion`] that the
//! worker resolves when it finishes, and the shared [`Progress`] counter
//! lets `synchronize` wait for "everything up to sequence N".

use crate::buffer::{BufferSlot, BufferState};
use qsoftmax_common::{ExecutionError, QSoftmaxError, Result, TensorData};
use qsoftmax_kernels::{KernelProvider, SoftmaxConfig};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Completion counters shared between the producer and the worker.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    /// Highest sequence number handed out by `invoke`.
    pub submitted: u64,
    /// Highest sequence number the worker has finished.
    pub completed: u64,
    /// Failures not yet reported by a `synchronize`, by sequence number.
    pub failures: BTreeMap<u64, QSoftmaxError>,
    pub failed_total: u64,
}

/// State shared by a context, its worker, and its completion tokens.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub buffers: Mutex<HashMap<u64, BufferSlot>>,
    pub progress: Mutex<Progress>,
    pub progress_cv: Condvar,
}

impl Shared {
    /// Block until the worker has finished `seq`, or until `timeout` passes.
    ///
    /// Returns `false` on timeout.
    pub fn wait_for(&self, seq: u64, timeout: Option<Duration>) -> bool {
        let guard = lock(&self.progress);
        match timeout {
            None => {
                let _guard = self
                    .progress_cv
                    .wait_while(guard, |p| p.completed < seq)
                    .unwrap_or_else(PoisonError::into_inner);
                true
            }
            Some(timeout) => {
                let (_guard, result) = self
                    .progress_cv
                    .wait_timeout_while(guard, timeout, |p| p.completed < seq)
                    .unwrap_or_else(PoisonError::into_inner);
                !result.timed_out()
            }
        }
    }
}

/// One-shot result slot for a single invocation.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    result: Mutex<Option<Result<()>>>,
    cv: Condvar,
}

impl Completion {
    fn resolve(&self, result: Result<()>) {
        *lock(&self.result) = Some(result);
        self.cv.notify_all();
    }

    fn is_resolved(&self) -> bool {
        lock(&self.result).is_some()
    }

    fn wait(&self) -> Result<()> {
        let guard = self
            .cv
            .wait_while(lock(&self.result), |r| r.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        (*guard).clone().unwrap_or(Ok(()))
    }
}

/// Future-like handle for one enqueued invocation.
///
/// Completion of a token implies completion of every invocation enqueued
/// before it on the same context.
#[derive(Debug, Clone)]
pub struct CompletionToken {
    pub(crate) seq: u64,
    pub(crate) context_id: u64,
    pub(crate) completion: Arc<Completion>,
}

impl CompletionToken {
    /// Position of the invocation in its context's queue, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Poll without blocking.
    pub fn is_complete(&self) -> bool {
        self.completion.is_resolved()
    }

    /// Block until this invocation finishes and return its own outcome.
    ///
    /// This does not make buffers readable; use
    /// [`ExecutionContext::synchronize`](crate::ExecutionContext::synchronize)
    /// for that.
    pub fn wait(&self) -> Result<()> {
        self.completion.wait()
    }
}

/// A softmax invocation as seen by the worker.
pub(crate) struct Invocation {
    pub seq: u64,
    pub src: u64,
    pub dst: u64,
    pub config: SoftmaxConfig,
    pub provider: &'static dyn KernelProvider,
    pub completion: Arc<Completion>,
}

pub(crate) enum Command {
    Softmax(Invocation),
}

/// Worker loop; returns once every sender has been dropped and the queue
/// is drained.
pub(crate) fn run_worker(context_id: u64, shared: Arc<Shared>, commands: Receiver<Command>) {
    debug!(context = context_id, "queue worker started");
    for command in commands {
        match command {
            Command::Softmax(invocation) => execute(&shared, invocation),
        }
    }
    debug!(context = context_id, "queue worker stopped");
}

fn execute(shared: &Shared, invocation: Invocation) {
    let Invocation { seq, src, dst, config, provider, completion } = invocation;
    let started = Instant::now();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run_softmax(shared, src, dst, &config, provider)
    }))
    .unwrap_or_else(|_| {
        Err(ExecutionError::Failed { reason: format!("{} kernel panicked", provider.name()) }
            .into())
    });

    if let Err(err) = &result {
        warn!(seq, error = %err, "invocation failed");
        let mut buffers = lock(&shared.buffers);
        for id in [src, dst] {
            if let Some(slot) = buffers.get_mut(&id) {
                slot.state = BufferState::Poisoned;
            }
        }
    } else {
        debug!(
            seq,
            kernel = provider.name(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "invocation complete"
        );
    }

    {
        let mut progress = lock(&shared.progress);
        progress.completed = seq;
        if let Err(err) = &result {
            progress.failed_total += 1;
            progress.failures.insert(seq, err.clone());
        }
    }
    shared.progress_cv.notify_all();
    completion.resolve(result);
}

fn run_softmax(
    shared: &Shared,
    src: u64,
    dst: u64,
    config: &SoftmaxConfig,
    provider: &dyn KernelProvider,
) -> Result<()> {
    // Snapshot the source and detach the destination so the kernel runs
    // without holding the buffer table.
    let (input, mut output) = {
        let mut buffers = lock(&shared.buffers);
        let input = buffers.get(&src).ok_or_else(|| missing(src))?.data.clone();
        let slot = buffers.get_mut(&dst).ok_or_else(|| missing(dst))?;
        let output = std::mem::replace(&mut slot.data, TensorData::F32(Vec::new()));
        (input, output)
    };

    let result = provider.softmax(&input, &mut output, config);

    if let Some(slot) = lock(&shared.buffers).get_mut(&dst) {
        slot.data = output;
    }
    result
}

fn missing(id: u64) -> QSoftmaxError {
    ExecutionError::Failed { reason: format!("buffer {id} was released while in use") }.into()
}
