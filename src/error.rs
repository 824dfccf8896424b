//! Error types for procwire-process.

use thiserror::Error;

/// Main error type for all child process operations.
///
/// Programmer errors (`AlreadyStarted`, `InvalidState`) are returned
/// synchronously at the call site. A process that cannot be spawned is not an
/// error here: it is reported through the exit path with no successful start.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// `start` was called more than once on the same process.
    #[error("Process already started")]
    AlreadyStarted,

    /// Write or close attempted on a stream that no longer accepts it.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// The execution context worker is gone, callbacks can no longer run.
    #[error("Execution context closed")]
    ContextClosed,
}

/// Result type alias using ProcessError.
pub type Result<T> = std::result::Result<T, ProcessError>;
