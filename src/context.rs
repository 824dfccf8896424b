//! Serialized execution context for consumer-visible callbacks.
//!
//! Native process events arrive on whatever thread the native layer happens to
//! run its I/O on. Every callback that a consumer can observe is re-dispatched
//! through an [`ExecutionContext`] so that callbacks for one process never
//! overlap and never run out of order.
//!
//! # Architecture
//!
//! ```text
//! stdout reader ─┐
//! stdin writer  ─┼─► mpsc::UnboundedSender<Task> ─► Context Task ─► callback
//! exit watcher  ─┤
//! caller        ─┘
//! ```
//!
//! Tasks are plain closures run one at a time to completion, in the order
//! they were queued.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, trace};

use crate::error::{ProcessError, Result};

/// A unit of work queued on the context.
type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a single logical, serialized execution timeline.
///
/// Cheaply cloneable. All clones feed the same worker, so ordering holds
/// across clones too. The worker task stops once every handle is dropped.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    tx: mpsc::UnboundedSender<Task>,
}

impl ExecutionContext {
    /// Create a context backed by a fresh worker task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        let (ctx, _worker) = Self::spawn();
        ctx
    }

    /// Create a context and return the worker's join handle alongside it.
    ///
    /// The join handle completes once all context handles have been dropped
    /// and the remaining queued tasks have run.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(context_loop(rx));
        (Self { tx }, worker)
    }

    /// Queue a task to run on the context.
    ///
    /// Never blocks. Fails only if the worker has stopped.
    pub fn run_on_context<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(task))
            .map_err(|_| ProcessError::ContextClosed)
    }

    /// Wait until every task queued before this call has run.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.run_on_context(move || {
            let _ = done_tx.send(());
        })?;
        done_rx.await.map_err(|_| ProcessError::ContextClosed)
    }

    /// Check whether the worker has stopped accepting tasks.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Main context loop - runs queued tasks one by one.
///
/// A panicking task is logged and dropped; the loop keeps serving the rest.
async fn context_loop(mut rx: mpsc::UnboundedReceiver<Task>) {
    while let Some(task) = rx.recv().await {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("Callback panicked on execution context");
        }
    }
    trace!("Execution context drained, worker exiting");
}
