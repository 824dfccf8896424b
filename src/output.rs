//! Readable side of a child's stdout or stderr.
//!
//! An [`OutputStream`] receives chunks from the native reader and hands them to
//! the registered data handler on the execution context, in arrival order.
//! Stdout and stderr are separate streams with independent ordering.
//!
//! Events that happen before a handler is registered are kept, not lost:
//! - chunks are buffered and flushed, in order, when a data handler is set
//! - end of stream is signaled once an end handler is set
//!
//! Buffering without a data handler is bounded by `output_buffer_max_size`.
//! Past that limit the oldest chunks are dropped.
//!
//! # Example
//!
//! ```ignore
//! process.stdout()
//!     .handler(|chunk| println!("{}", String::from_utf8_lossy(&chunk)))
//!     .end_handler(|| println!("stdout closed"));
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::context::ExecutionContext;
use crate::native::OutputSource;

type DataHandler = Arc<dyn Fn(Bytes) + Send + Sync>;
type EndHandler = Arc<dyn Fn() + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&io::Error) + Send + Sync>;

/// One output pipe of a child process.
///
/// Cheaply cloneable; clones share the same stream.
#[derive(Clone)]
pub struct OutputStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    source: OutputSource,
    context: ExecutionContext,
    /// Limit on `pending` bytes while no data handler is registered.
    max_buffered: usize,
    state: Mutex<StreamState>,
}

#[derive(Default)]
struct StreamState {
    /// Set once the native side reports end of stream.
    closed: bool,
    /// End handler already invoked.
    end_signaled: bool,
    /// Chunks waiting for a data handler, or for an earlier flush.
    pending: VecDeque<Bytes>,
    /// Total size of `pending`.
    buffered: usize,
    data: Option<DataHandler>,
    end: Option<EndHandler>,
    error: Option<ErrorHandler>,
}

impl OutputStream {
    pub(crate) fn new(
        source: OutputSource,
        context: ExecutionContext,
        max_buffered: usize,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                source,
                context,
                max_buffered,
                state: Mutex::new(StreamState::default()),
            }),
        }
    }

    /// Which pipe this stream reads.
    pub fn source(&self) -> OutputSource {
        self.inner.source
    }

    /// Whether end of stream has been reached.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Set the handler receiving data chunks.
    ///
    /// Chunks received before registration are delivered first.
    pub fn handler<F>(&self, handler: F) -> &Self
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.inner.state.lock().data = Some(Arc::new(handler));
        let inner = self.inner.clone();
        self.schedule(move || inner.flush());
        self
    }

    /// Set the handler called once no more data will arrive.
    pub fn end_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.state.lock().end = Some(Arc::new(handler));
        let inner = self.inner.clone();
        self.schedule(move || inner.signal_end());
        self
    }

    /// Set the handler receiving read errors.
    pub fn exception_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn(&io::Error) + Send + Sync + 'static,
    {
        self.inner.state.lock().error = Some(Arc::new(handler));
        self
    }

    /// Forward a chunk from the native reader. Empty chunks are ignored.
    pub(crate) fn deliver(&self, chunk: Bytes) {
        if chunk.is_empty() || self.inner.state.lock().closed {
            return;
        }
        let inner = self.inner.clone();
        self.schedule(move || inner.dispatch(chunk));
    }

    /// Mark end of stream. Idempotent.
    pub(crate) fn mark_closed(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        let inner = self.inner.clone();
        self.schedule(move || inner.signal_end());
    }

    /// Report a read error from the native reader.
    pub(crate) fn fail(&self, error: io::Error) {
        let inner = self.inner.clone();
        self.schedule(move || {
            let handler = inner.state.lock().error.clone();
            match handler {
                Some(handler) => handler(&error),
                None => warn!(
                    stream = inner.source.as_str(),
                    error = %error,
                    "Unhandled read error"
                ),
            }
        });
    }

    fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.context.run_on_context(task).is_err() {
            warn!(
                stream = self.inner.source.as_str(),
                "Execution context closed, dropping stream event"
            );
        }
    }
}

impl StreamInner {
    /// Deliver one chunk, or queue it behind earlier undelivered ones.
    fn dispatch(&self, chunk: Bytes) {
        let handler = {
            let mut state = self.state.lock();
            let ready = match &state.data {
                Some(handler) if state.pending.is_empty() => Some(handler.clone()),
                _ => None,
            };
            match ready {
                Some(handler) => handler,
                None => {
                    state.buffered += chunk.len();
                    state.pending.push_back(chunk);
                    if state.data.is_none() {
                        self.trim(&mut state);
                    }
                    return;
                }
            }
        };
        handler(chunk);
    }

    /// Drop the oldest buffered chunks until the buffer fits its limit.
    fn trim(&self, state: &mut StreamState) {
        let mut dropped = 0usize;
        while state.buffered > self.max_buffered {
            let Some(chunk) = state.pending.pop_front() else {
                break;
            };
            state.buffered -= chunk.len();
            dropped += chunk.len();
        }
        if dropped > 0 {
            trace!(
                stream = self.source.as_str(),
                dropped,
                "No data handler, dropped buffered output"
            );
        }
    }

    /// Deliver all queued chunks, then the end event if it is due.
    fn flush(&self) {
        loop {
            let next = {
                let mut state = self.state.lock();
                let Some(handler) = state.data.clone() else {
                    break;
                };
                let chunk = state.pending.pop_front();
                if let Some(chunk) = &chunk {
                    state.buffered -= chunk.len();
                }
                chunk.map(|chunk| (handler, chunk))
            };
            match next {
                Some((handler, chunk)) => handler(chunk),
                None => break,
            }
        }
        self.signal_end();
    }

    fn signal_end(&self) {
        let handler = {
            let mut state = self.state.lock();
            if !state.closed || state.end_signaled {
                return;
            }
            if state.data.is_some() && !state.pending.is_empty() {
                // The pending flush signals end once it has emptied the queue.
                return;
            }
            let Some(handler) = state.end.clone() else {
                return;
            };
            state.end_signaled = true;
            handler
        };
        handler();
    }
}
