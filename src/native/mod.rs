//! Native process facade - the contract between the controller and the OS layer.
//!
//! The controller drives a native process through three traits:
//! - [`NativeLauncher`] - creates the OS process from a [`SpawnRequest`]
//! - [`NativeProcess`] - operations on a started process (signals, stdin)
//! - [`NativeHandler`] - inbound callbacks, invoked from the native layer's
//!   own threads in no particular relation to the caller's thread
//!
//! [`TokioLauncher`] is the default implementation, built on `tokio::process`.
//!
//! # Stdin model
//!
//! Writes are readiness driven. The controller calls
//! [`NativeProcess::want_write`] when it has bytes queued; the native layer
//! answers with [`NativeHandler::on_stdin_ready`], handing over a buffer to fill.
//! The handler returns whether it wants another round.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;

use crate::config::ProcessConfig;
use crate::spawn::SpawnRequest;

#[cfg(test)]
pub(crate) mod mock;
mod tokio_process;

pub use self::tokio_process::{TokioLauncher, SPAWN_FAILURE_EXIT_CODE};

/// Which output pipe an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSource {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputSource {
    /// Short name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputSource::Stdout => "stdout",
            OutputSource::Stderr => "stderr",
        }
    }
}

/// Starts OS processes.
pub trait NativeLauncher: Send + Sync + 'static {
    /// Launch the process described by `request`.
    ///
    /// All outcomes are reported through `handler`: `on_start` once the OS
    /// process exists, or `on_exit` alone if it could not be created.
    fn start(
        &self,
        request: SpawnRequest,
        config: &ProcessConfig,
        handler: Arc<dyn NativeHandler>,
    );
}

/// A started OS process.
///
/// Every method returns immediately; effects are observed later through the
/// [`NativeHandler`] callbacks.
pub trait NativeProcess: Send + Sync + 'static {
    /// Ask for an `on_stdin_ready` callback.
    fn want_write(&self);

    /// Close the child's stdin.
    ///
    /// A non-forced close lets bytes already handed over reach the child first.
    fn close_stdin(&self, force: bool);

    /// Terminate the process: gracefully, or unconditionally with `force`.
    fn destroy(&self, force: bool);

    /// OS process ID.
    fn pid(&self) -> u32;

    /// Whether the OS process is still alive.
    fn is_running(&self) -> bool;
}

/// Callbacks from the native layer.
///
/// May be called from any thread, concurrently with each other and with the
/// controller's public API.
pub trait NativeHandler: Send + Sync + 'static {
    /// Called right before the OS process is created.
    fn on_pre_start(&self) {}

    /// The OS process exists.
    fn on_start(&self, process: Arc<dyn NativeProcess>);

    /// A stdout chunk, possibly empty. `closed` marks the end of the stream.
    fn on_stdout(&self, chunk: &[u8], closed: bool);

    /// A stderr chunk, possibly empty. `closed` marks the end of the stream.
    fn on_stderr(&self, chunk: &[u8], closed: bool);

    /// Reading from an output pipe failed. The stream is closed right after.
    fn on_output_error(&self, _source: OutputSource, _error: io::Error) {}

    /// Stdin can take up to `capacity` bytes: append them to `buffer`.
    ///
    /// Returns `true` to be called again once those bytes are written.
    fn on_stdin_ready(&self, buffer: &mut BytesMut, capacity: usize) -> bool;

    /// The process is gone. Last callback for this process.
    fn on_exit(&self, code: i32);
}
