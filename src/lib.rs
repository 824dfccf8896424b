//! # procwire-process
//!
//! Asynchronous child process I/O with backpressure and serialized callbacks.
//!
//! The native process layer delivers output chunks and stdin readiness from
//! its own threads. This crate turns that into a process object whose
//! callbacks all run one at a time, in order, on a single execution context.
//!
//! ## Architecture
//!
//! - **Process** ([`Process`]): lifecycle state machine, `Created → Starting → Running → Exited`
//! - **Stdin** ([`Stdin`]): write queue with a high-water mark and drain notification
//! - **Output** ([`OutputStream`]): stdout/stderr chunk delivery
//! - **Context** ([`ExecutionContext`]): the serialization boundary for callbacks
//! - **Native** ([`native`]): the OS-facing facade, backed by `tokio::process`
//!
//! ## Example
//!
//! ```ignore
//! use procwire_process::{Process, SpawnRequest};
//!
//! #[tokio::main]
//! async fn main() -> procwire_process::Result<()> {
//!     let process = Process::builder(SpawnRequest::new("cat").inherit_env())
//!         .write_queue_max_size(4096)
//!         .build();
//!
//!     process
//!         .stdout()
//!         .handler(|chunk| print!("{}", String::from_utf8_lossy(&chunk)));
//!     process.exit_handler(|code| eprintln!("cat exited with {code}"));
//!     process.start()?;
//!
//!     let stdin = process.stdin();
//!     stdin.send("hello\n").await?;
//!     stdin.close()?;
//!
//!     process.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod native;

mod output;
mod process;
mod spawn;
mod stdin;

pub use config::ProcessConfig;
pub use context::ExecutionContext;
pub use error::{ProcessError, Result};
pub use output::OutputStream;
pub use process::{Phase, Process, ProcessBuilder};
pub use spawn::SpawnRequest;
pub use stdin::{Stdin, StdinStatus};
