//! `tokio::process` implementation of the native facade.
//!
//! One spawned child gets four tasks:
//!
//! ```text
//! stdout reader ─► on_stdout ─┐
//! stderr reader ─► on_stderr ─┼─► wait task ─► on_exit
//! child.wait()  ──────────────┘
//! stdin writer  ◄─ want_write / close_stdin, ─► on_stdin_ready
//! ```
//!
//! The wait task reports exit only after both readers have seen end of
//! stream, so no output callback follows `on_exit`.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{NativeHandler, NativeLauncher, NativeProcess, OutputSource};
use crate::config::ProcessConfig;
use crate::spawn::SpawnRequest;

/// Exit code reported when the OS process could not be created.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = i32::MIN;

/// Requests for the stdin writer task.
#[derive(Debug, Clone, Copy)]
enum StdinCommand {
    WantWrite,
    Close { force: bool },
}

/// Launches children with `tokio::process::Command`.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    /// Create a launcher.
    pub fn new() -> Self {
        Self
    }

    fn command(request: &SpawnRequest) -> Command {
        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

impl NativeLauncher for TokioLauncher {
    fn start(
        &self,
        request: SpawnRequest,
        config: &ProcessConfig,
        handler: Arc<dyn NativeHandler>,
    ) {
        handler.on_pre_start();

        let mut child = match Self::command(&request).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %request.command, error = %e, "Failed to spawn process");
                handler.on_exit(SPAWN_FAILURE_EXIT_CODE);
                return;
            }
        };

        let pid = child.id().unwrap_or(0);
        debug!(pid, command = %request.command, "Process spawned");

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        handler.on_start(Arc::new(TokioProcess {
            pid,
            running: running.clone(),
            stdin_tx,
            kill_tx,
        }));

        if let Some(stdin) = stdin {
            tokio::spawn(stdin_loop(
                stdin,
                stdin_rx,
                handler.clone(),
                config.stdin_chunk_size,
                pid,
            ));
        }

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            readers.push(tokio::spawn(read_loop(
                stdout,
                OutputSource::Stdout,
                handler.clone(),
                config.read_buffer_size,
            )));
        }
        if let Some(stderr) = stderr {
            readers.push(tokio::spawn(read_loop(
                stderr,
                OutputSource::Stderr,
                handler.clone(),
                config.read_buffer_size,
            )));
        }

        tokio::spawn(wait_loop(child, kill_rx, running, readers, handler, pid));
    }
}

/// Handle to a child started by [`TokioLauncher`].
struct TokioProcess {
    pid: u32,
    running: Arc<AtomicBool>,
    stdin_tx: mpsc::UnboundedSender<StdinCommand>,
    kill_tx: mpsc::UnboundedSender<bool>,
}

impl NativeProcess for TokioProcess {
    fn want_write(&self) {
        if self.stdin_tx.send(StdinCommand::WantWrite).is_err() {
            debug!(pid = self.pid, "Stdin writer gone, dropping write request");
        }
    }

    fn close_stdin(&self, force: bool) {
        let _ = self.stdin_tx.send(StdinCommand::Close { force });
    }

    fn destroy(&self, force: bool) {
        if self.kill_tx.send(force).is_err() {
            debug!(pid = self.pid, "Process already reaped, ignoring kill");
        }
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Stdin writer loop - pulls bytes from the controller on demand.
///
/// Commands are handled in order, so a close queued behind a write request
/// only takes effect once that round has been written out.
async fn stdin_loop(
    mut stdin: ChildStdin,
    mut rx: mpsc::UnboundedReceiver<StdinCommand>,
    handler: Arc<dyn NativeHandler>,
    chunk_size: usize,
    pid: u32,
) {
    while let Some(command) = rx.recv().await {
        match command {
            StdinCommand::WantWrite => loop {
                let mut buf = BytesMut::with_capacity(chunk_size);
                let more = handler.on_stdin_ready(&mut buf, chunk_size);

                if !buf.is_empty() {
                    if let Err(e) = stdin.write_all(&buf).await {
                        debug!(pid, error = %e, "Stdin write failed, closing writer");
                        return;
                    }
                }

                if !more {
                    if let Err(e) = stdin.flush().await {
                        debug!(pid, error = %e, "Stdin flush failed, closing writer");
                        return;
                    }
                    break;
                }
            },
            StdinCommand::Close { force } => {
                if !force {
                    let _ = stdin.shutdown().await;
                }
                debug!(pid, force, "Stdin closed");
                return;
            }
        }
    }
}

/// Output reader loop - forwards chunks until end of stream.
async fn read_loop<R>(
    mut reader: R,
    source: OutputSource,
    handler: Arc<dyn NativeHandler>,
    buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => emit(&*handler, source, &buf[..n], false),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                handler.on_output_error(source, e);
                break;
            }
        }
    }

    emit(&*handler, source, &[], true);
}

fn emit(handler: &dyn NativeHandler, source: OutputSource, chunk: &[u8], closed: bool) {
    match source {
        OutputSource::Stdout => handler.on_stdout(chunk, closed),
        OutputSource::Stderr => handler.on_stderr(chunk, closed),
    }
}

/// Wait loop - owns the child, delivers kill requests, reports exit.
async fn wait_loop(
    mut child: Child,
    mut kill_rx: mpsc::UnboundedReceiver<bool>,
    running: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
    handler: Arc<dyn NativeHandler>,
    pid: u32,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(force) = kill_rx.recv() => signal(&mut child, pid, force),
        }
    };
    running.store(false, Ordering::Release);

    for reader in readers {
        let _ = reader.await;
    }

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!(pid, error = %e, "Failed to wait for process");
            -1
        }
    };
    debug!(pid, code, "Process exited");
    handler.on_exit(code);
}

#[cfg(unix)]
fn signal(_child: &mut Child, pid: u32, force: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let sig = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match kill(Pid::from_raw(pid as i32), sig) {
        Ok(()) => debug!(pid, signal = ?sig, "Sent signal"),
        Err(e) => warn!(pid, signal = ?sig, error = %e, "Failed to send signal"),
    }
}

#[cfg(not(unix))]
fn signal(child: &mut Child, pid: u32, force: bool) {
    if let Err(e) = child.start_kill() {
        warn!(pid, force, error = %e, "Failed to kill process");
    }
}

/// Plain exit code, or `128 + signal` for a signal death on Unix.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }

    -1
}
