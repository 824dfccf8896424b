//! Stdin flow control with backpressure.
//!
//! Writes never block. Each write is appended to a pending queue. The native
//! layer pulls bytes out of the queue when the child's stdin can take more
//! (see [`NativeHandler::on_stdin_ready`](crate::native::NativeHandler::on_stdin_ready)).
//!
//! # Backpressure
//!
//! The queue has a high-water mark (`write_queue_max_size`, default 1024):
//! - `write_queue_full()` is true while queued bytes exceed the mark
//! - the drain handler fires once queued bytes fall to half the mark or less
//!
//! Producers should stop when the queue is full and resume from the drain
//! handler, or simply use [`Stdin::send`], which does both.
//!
//! # Closing
//!
//! `close()` with nothing queued closes the child's stdin immediately. With
//! bytes still queued, or before the process has started, the stream goes to
//! `Closing` and the native close happens once the queue has drained.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::native::NativeProcess;
use crate::process::{Phase, ProcessInner};

/// Single-shot drain callback.
pub(crate) type DrainHandler = Box<dyn FnOnce() + Send>;

/// State of a child's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinStatus {
    /// Writes accepted.
    Open,
    /// Close requested, queued bytes still being flushed. No new writes.
    Closing,
    /// Native stream closed.
    Closed,
}

/// Ordered byte buffers awaiting transmission, with a running byte count.
#[derive(Debug, Default)]
pub(crate) struct WriteQueue {
    buffers: VecDeque<Bytes>,
    bytes: usize,
}

impl WriteQueue {
    pub(crate) fn push(&mut self, data: Bytes) {
        self.bytes += data.len();
        self.buffers.push_back(data);
    }

    #[inline]
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Move up to `capacity` bytes from the front of the queue into `out`.
    ///
    /// A buffer that does not fit is split; its tail goes back to the front.
    /// Returns the number of bytes moved.
    pub(crate) fn drain_into(&mut self, out: &mut BytesMut, capacity: usize) -> usize {
        let mut remaining = capacity;

        while remaining > 0 {
            let Some(mut front) = self.buffers.pop_front() else {
                break;
            };
            if front.len() <= remaining {
                remaining -= front.len();
                out.extend_from_slice(&front);
            } else {
                let head = front.split_to(remaining);
                out.extend_from_slice(&head);
                self.buffers.push_front(front);
                remaining = 0;
            }
        }

        let moved = capacity - remaining;
        self.bytes -= moved;
        moved
    }
}

/// What the controller must ask of the native layer once the process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartAction {
    Nothing,
    WantWrite,
    Close,
}

impl StartAction {
    pub(crate) fn apply(self, native: &dyn NativeProcess) {
        match self {
            StartAction::Nothing => {}
            StartAction::WantWrite => native.want_write(),
            StartAction::Close => native.close_stdin(false),
        }
    }
}

/// Flow controller fields, guarded by the process state lock.
pub(crate) struct FlowState {
    status: StdinStatus,
    queue: WriteQueue,
    max_size: usize,
    want_write: bool,
    on_drain: Option<DrainHandler>,
}

impl FlowState {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            status: StdinStatus::Open,
            queue: WriteQueue::default(),
            max_size,
            want_write: false,
            on_drain: None,
        }
    }

    /// Queue `data`. Returns whether write-readiness must be requested.
    pub(crate) fn write(&mut self, data: Bytes, running: bool) -> Result<bool> {
        if self.status != StdinStatus::Open {
            return Err(ProcessError::InvalidState("stdin is closing or closed"));
        }
        if data.is_empty() {
            return Ok(false);
        }

        let was_empty = self.queue.is_empty();
        self.queue.push(data);

        if running && was_empty && !self.want_write {
            self.want_write = true;
            return Ok(true);
        }
        Ok(false)
    }

    /// Request close. Returns whether the native stream must be closed now.
    pub(crate) fn close(&mut self, running: bool) -> bool {
        if self.status != StdinStatus::Open {
            return false;
        }
        if running && self.queue.is_empty() {
            self.status = StdinStatus::Closed;
            true
        } else {
            self.status = StdinStatus::Closing;
            false
        }
    }

    /// The process just started.
    ///
    /// A close requested before start stays in effect: it completes once
    /// everything written before it has been flushed.
    pub(crate) fn on_start(&mut self) -> StartAction {
        match self.status {
            StdinStatus::Open | StdinStatus::Closing if !self.queue.is_empty() => {
                self.want_write = true;
                StartAction::WantWrite
            }
            StdinStatus::Closing => {
                self.status = StdinStatus::Closed;
                StartAction::Close
            }
            _ => StartAction::Nothing,
        }
    }

    /// Fill a native write buffer.
    ///
    /// Returns `(more, close)`: whether more readiness rounds are wanted, and
    /// whether the native stream must now be closed.
    pub(crate) fn fill(&mut self, out: &mut BytesMut, capacity: usize) -> (bool, bool) {
        self.queue.drain_into(out, capacity);

        if !self.queue.is_empty() {
            return (true, false);
        }

        self.want_write = false;
        if self.status == StdinStatus::Closing {
            self.status = StdinStatus::Closed;
            return (false, true);
        }
        (false, false)
    }

    pub(crate) fn on_exit(&mut self) {
        self.status = StdinStatus::Closed;
        self.want_write = false;
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.queue.bytes() > self.max_size
    }

    #[inline]
    pub(crate) fn is_drained(&self) -> bool {
        self.queue.bytes() <= self.max_size / 2
    }

    pub(crate) fn take_drain_if_drained(&mut self) -> Option<DrainHandler> {
        if self.is_drained() {
            self.on_drain.take()
        } else {
            None
        }
    }

    pub(crate) fn take_drain(&mut self) -> Option<DrainHandler> {
        self.on_drain.take()
    }
}

/// Writable stdin of a child process.
///
/// Cheaply cloneable; clones refer to the same stream.
#[derive(Clone)]
pub struct Stdin {
    inner: Arc<ProcessInner>,
}

impl Stdin {
    pub(crate) fn new(inner: Arc<ProcessInner>) -> Self {
        Self { inner }
    }

    /// Queue bytes for the child.
    ///
    /// Never blocks. Fails with `InvalidState` once `close` has been called
    /// or the process has exited.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        let native = {
            let mut state = self.inner.state.lock();
            let running = state.phase == Phase::Running;
            if state.stdin.write(data.into(), running)? {
                state.native.clone()
            } else {
                None
            }
        };

        if let Some(native) = native {
            native.want_write();
        }
        Ok(())
    }

    /// Write, then wait for the drain handler if the queue is now full.
    ///
    /// Replaces any drain handler registered before. Fails if the process
    /// exits before the queue drains.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.write(data)?;
        if !self.write_queue_full() {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        self.drain_handler(move || {
            let _ = tx.send(());
        });
        rx.await
            .map_err(|_| ProcessError::InvalidState("process exited before stdin drained"))
    }

    /// Close the child's stdin once queued bytes are flushed.
    ///
    /// Calls after the first are no-ops.
    pub fn close(&self) -> Result<()> {
        let native = {
            let mut state = self.inner.state.lock();
            let running = state.phase == Phase::Running;
            if state.stdin.close(running) {
                state.native.clone()
            } else {
                None
            }
        };

        if let Some(native) = native {
            debug!(pid = native.pid(), "Closing stdin");
            native.close_stdin(false);
        }
        Ok(())
    }

    /// Set the high-water mark in bytes.
    pub fn set_write_queue_max_size(&self, max_size: usize) -> &Self {
        self.inner.state.lock().stdin.max_size = max_size;
        self
    }

    /// Whether queued bytes exceed the high-water mark.
    pub fn write_queue_full(&self) -> bool {
        self.inner.state.lock().stdin.is_full()
    }

    /// Set the single-shot handler called once the queue has drained.
    ///
    /// The handler fires on the execution context when queued bytes are at
    /// most half the high-water mark, then is cleared. Registering checks
    /// right away, so a handler set on an already drained queue fires soon.
    /// Once the exit handler has run, the handler is dropped without firing.
    pub fn drain_handler<F>(&self, handler: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        let rejected = {
            let mut state = self.inner.state.lock();
            if state.exit_delivered {
                Some(handler)
            } else {
                state.stdin.on_drain = Some(Box::new(handler));
                None
            }
        };
        if rejected.is_some() {
            debug!("Process exited, dropping drain handler");
            return self;
        }

        let inner = self.inner.clone();
        self.inner.schedule(move || check_drained(&inner));
        self
    }

    /// Bytes queued and not yet handed to the child.
    pub fn pending_bytes(&self) -> usize {
        self.inner.state.lock().stdin.queue.bytes()
    }

    /// Current stream state.
    pub fn status(&self) -> StdinStatus {
        self.inner.state.lock().stdin.status
    }
}

/// Fire the drain handler if the queue is low enough. Runs on the context.
pub(crate) fn check_drained(inner: &ProcessInner) {
    let handler = {
        let mut state = inner.state.lock();
        if state.exit_delivered {
            return;
        }
        state.stdin.take_drain_if_drained()
    };

    if let Some(handler) = handler {
        handler();
    }
}

/// Native write-readiness: fill `out` from the queue.
pub(crate) fn on_stdin_ready(
    inner: &Arc<ProcessInner>,
    out: &mut BytesMut,
    capacity: usize,
) -> bool {
    let (more, native) = {
        let mut state = inner.state.lock();
        let (more, close) = state.stdin.fill(out, capacity);
        let native = if close { state.native.clone() } else { None };
        (more, native)
    };

    let drain_inner = inner.clone();
    inner.schedule(move || check_drained(&drain_inner));

    if let Some(native) = native {
        debug!(pid = native.pid(), "Stdin drained, closing");
        native.close_stdin(false);
    }
    more
}
