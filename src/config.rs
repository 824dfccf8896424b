//! Process I/O configuration.
//!
//! All sizes are in bytes.
//!
//! - `write_queue_max_size`: stdin high-water mark (default: 1024)
//! - `read_buffer_size`: per-read buffer for stdout/stderr (default: 64KB)
//! - `stdin_chunk_size`: capacity offered per write-readiness round (default: 64KB)
//! - `output_buffer_max_size`: stdout/stderr bytes kept while no data handler
//!   is registered (default: 64KB)

use serde::{Deserialize, Serialize};

/// Default stdin high-water mark.
pub const DEFAULT_WRITE_QUEUE_MAX_SIZE: usize = 1024;

/// Default read buffer size for stdout/stderr.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default capacity handed to the stdin flow controller per readiness round.
pub const DEFAULT_STDIN_CHUNK_SIZE: usize = 64 * 1024;

/// Default limit on output buffered per stream before a data handler exists.
pub const DEFAULT_OUTPUT_BUFFER_MAX_SIZE: usize = 64 * 1024;

/// Configuration for a child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Queued stdin bytes above which the queue reports full.
    pub write_queue_max_size: usize,
    /// Buffer size for each stdout/stderr read.
    pub read_buffer_size: usize,
    /// Maximum bytes drained from the stdin queue per readiness round.
    pub stdin_chunk_size: usize,
    /// Bytes kept per output stream while no data handler is registered.
    /// The oldest chunks are dropped beyond it.
    pub output_buffer_max_size: usize,
}

impl ProcessConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stdin high-water mark.
    pub fn write_queue_max_size(mut self, size: usize) -> Self {
        self.write_queue_max_size = size;
        self
    }

    /// Set the stdout/stderr read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the per-round stdin chunk size.
    pub fn stdin_chunk_size(mut self, size: usize) -> Self {
        self.stdin_chunk_size = size.max(1);
        self
    }

    /// Set the per-stream limit on output buffered without a data handler.
    pub fn output_buffer_max_size(mut self, size: usize) -> Self {
        self.output_buffer_max_size = size;
        self
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            write_queue_max_size: DEFAULT_WRITE_QUEUE_MAX_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            stdin_chunk_size: DEFAULT_STDIN_CHUNK_SIZE,
            output_buffer_max_size: DEFAULT_OUTPUT_BUFFER_MAX_SIZE,
        }
    }
}
