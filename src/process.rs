//! Child process handle and lifecycle state machine.
//!
//! A [`Process`] moves through `Created → Starting → Running → Exited`.
//! A spawn failure goes from `Starting` straight to `Exited`.
//!
//! Native events arrive through [`NativeHandler`] on arbitrary threads. The
//! shared fields are updated under a short lock that is never held while
//! calling user code or the native layer; user-visible callbacks are then
//! queued on the process's [`ExecutionContext`].
//!
//! # Example
//!
//! ```ignore
//! use procwire_process::{Process, SpawnRequest};
//!
//! let process = Process::create(SpawnRequest::new("cat").inherit_env());
//! process.stdout().handler(|chunk| print!("{}", String::from_utf8_lossy(&chunk)));
//! process.exit_handler(|code| println!("exited with {code}"));
//! process.start_with(|p| println!("started pid {:?}", p.pid()))?;
//!
//! process.stdin().write("hello\n")?;
//! process.stdin().close()?;
//! let code = process.wait().await?;
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::ProcessConfig;
use crate::context::ExecutionContext;
use crate::error::{ProcessError, Result};
use crate::native::{NativeHandler, NativeLauncher, NativeProcess, OutputSource, TokioLauncher};
use crate::output::OutputStream;
use crate::spawn::SpawnRequest;
use crate::stdin::{self, FlowState, Stdin};

type StartedHandler = Box<dyn FnOnce(&Process) + Send>;
type ExitHandler = Box<dyn FnOnce(i32) + Send>;

/// Lifecycle phase of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, `start` not called yet.
    Created,
    /// Start requested, the OS process is not known to exist yet.
    Starting,
    /// The OS process exists.
    Running,
    /// Exit observed. Terminal.
    Exited,
}

/// Fields shared between the caller's thread and native callbacks.
pub(crate) struct State {
    pub(crate) phase: Phase,
    /// Present iff `phase == Running`.
    pub(crate) native: Option<Arc<dyn NativeProcess>>,
    pub(crate) stdin: FlowState,
    /// Set on the context once the exit handler has run.
    pub(crate) exit_delivered: bool,
    request: Option<SpawnRequest>,
    on_started: Option<StartedHandler>,
    on_exit: Option<ExitHandler>,
}

pub(crate) struct ProcessInner {
    pub(crate) state: Mutex<State>,
    context: ExecutionContext,
    launcher: Arc<dyn NativeLauncher>,
    config: ProcessConfig,
    stdout: OutputStream,
    stderr: OutputStream,
    exit_tx: watch::Sender<Option<i32>>,
}

impl ProcessInner {
    /// Queue a task on the execution context, logging if it is gone.
    pub(crate) fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.context.run_on_context(task).is_err() {
            warn!("Execution context closed, dropping process event");
        }
    }
}

/// Builder for a [`Process`].
pub struct ProcessBuilder {
    request: SpawnRequest,
    config: ProcessConfig,
    launcher: Option<Arc<dyn NativeLauncher>>,
    context: Option<ExecutionContext>,
}

impl ProcessBuilder {
    /// Create a builder for the given request.
    pub fn new(request: SpawnRequest) -> Self {
        Self {
            request,
            config: ProcessConfig::default(),
            launcher: None,
            context: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ProcessConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the stdin high-water mark.
    ///
    /// Default: 1024 bytes
    pub fn write_queue_max_size(mut self, size: usize) -> Self {
        self.config.write_queue_max_size = size;
        self
    }

    /// Use a custom native layer instead of [`TokioLauncher`].
    pub fn launcher<L: NativeLauncher>(mut self, launcher: L) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Deliver callbacks on an existing context.
    ///
    /// Processes sharing a context share one callback timeline.
    pub fn context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Build the process without starting it.
    ///
    /// # Panics
    ///
    /// Panics if no context was given and this is called outside a Tokio
    /// runtime, since a new context spawns its worker task.
    pub fn build(self) -> Process {
        let context = self.context.unwrap_or_default();
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(TokioLauncher::new()));
        let (exit_tx, _) = watch::channel(None);

        Process {
            inner: Arc::new(ProcessInner {
                state: Mutex::new(State {
                    phase: Phase::Created,
                    native: None,
                    stdin: FlowState::new(self.config.write_queue_max_size),
                    exit_delivered: false,
                    request: Some(self.request),
                    on_started: None,
                    on_exit: None,
                }),
                stdout: OutputStream::new(
                    OutputSource::Stdout,
                    context.clone(),
                    self.config.output_buffer_max_size,
                ),
                stderr: OutputStream::new(
                    OutputSource::Stderr,
                    context.clone(),
                    self.config.output_buffer_max_size,
                ),
                context,
                launcher,
                config: self.config,
                exit_tx,
            }),
        }
    }

    /// Build and start the process.
    pub fn spawn(self) -> Result<Process> {
        let process = self.build();
        process.start()?;
        Ok(process)
    }
}

/// A child process.
///
/// Cheaply cloneable; clones refer to the same process. All callbacks are
/// delivered one at a time, in order, on the process's execution context.
#[derive(Clone)]
pub struct Process {
    pub(crate) inner: Arc<ProcessInner>,
}

impl Process {
    /// Create a builder.
    pub fn builder(request: SpawnRequest) -> ProcessBuilder {
        ProcessBuilder::new(request)
    }

    /// Create a process with default settings, not started yet.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn create(request: SpawnRequest) -> Process {
        ProcessBuilder::new(request).build()
    }

    /// Create and start a process with default settings.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(request: SpawnRequest) -> Result<Process> {
        ProcessBuilder::new(request).spawn()
    }

    /// Start the process.
    pub fn start(&self) -> Result<()> {
        self.start_with(|_| {})
    }

    /// Start the process, calling `on_started` once it is running.
    ///
    /// `on_started` also fires, right before the exit handler, when the
    /// process could not be spawned at all. Fails with `AlreadyStarted` on a
    /// second call. The native spawn itself happens on the context, off the
    /// caller's stack.
    pub fn start_with<F>(&self, on_started: F) -> Result<()>
    where
        F: FnOnce(&Process) + Send + 'static,
    {
        let request = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Created {
                return Err(ProcessError::AlreadyStarted);
            }
            let request = state.request.take().ok_or(ProcessError::AlreadyStarted)?;
            state.phase = Phase::Starting;
            state.on_started = Some(Box::new(on_started));
            request
        };

        debug!(command = %request.command, args = ?request.args, "Starting process");

        let launcher = self.inner.launcher.clone();
        let config = self.inner.config.clone();
        let handler: Arc<dyn NativeHandler> = Arc::new(NativeBridge {
            process: self.clone(),
        });
        self.inner
            .context
            .run_on_context(move || launcher.start(request, &config, handler))
    }

    /// Set the handler called with the exit code.
    pub fn exit_handler<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(i32) + Send + 'static,
    {
        self.inner.state.lock().on_exit = Some(Box::new(handler));
        self
    }

    /// Wait until the exit handler has been delivered and return the code.
    pub async fn wait(&self) -> Result<i32> {
        let mut rx = self.inner.exit_tx.subscribe();
        let code = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ProcessError::ContextClosed)?;
        code.ok_or(ProcessError::ContextClosed)
    }

    /// Exit code, once delivered.
    pub fn exit_code(&self) -> Option<i32> {
        *self.inner.exit_tx.borrow()
    }

    /// OS process ID while running.
    pub fn pid(&self) -> Option<u32> {
        self.native().map(|native| native.pid())
    }

    /// Whether the OS process is alive.
    pub fn is_running(&self) -> bool {
        self.native().is_some_and(|native| native.is_running())
    }

    /// Request graceful termination (`SIGTERM` on Unix).
    pub fn kill(&self) {
        self.kill_with(false);
    }

    /// Request termination.
    ///
    /// With `force == false` the child may run its shutdown logic, or ignore
    /// the request. With `force == true` it is guaranteed to die, though
    /// `is_running` can stay true for a moment after this returns.
    /// No-op unless running.
    pub fn kill_with(&self, force: bool) {
        if let Some(native) = self.native() {
            debug!(pid = native.pid(), force, "Killing process");
            native.destroy(force);
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// The child's stdin.
    pub fn stdin(&self) -> Stdin {
        Stdin::new(self.inner.clone())
    }

    /// The child's stdout.
    pub fn stdout(&self) -> &OutputStream {
        &self.inner.stdout
    }

    /// The child's stderr.
    pub fn stderr(&self) -> &OutputStream {
        &self.inner.stderr
    }

    /// Context on which this process delivers callbacks.
    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    fn native(&self) -> Option<Arc<dyn NativeProcess>> {
        self.inner.state.lock().native.clone()
    }

    fn output(&self, source: OutputSource) -> &OutputStream {
        match source {
            OutputSource::Stdout => &self.inner.stdout,
            OutputSource::Stderr => &self.inner.stderr,
        }
    }

    fn fire_started(&self) {
        let handler = self.inner.state.lock().on_started.take();
        if let Some(handler) = handler {
            handler(self);
        }
    }

    fn fire_exit(&self, code: i32) {
        let (handler, drain) = {
            let mut state = self.inner.state.lock();
            state.exit_delivered = true;
            (state.on_exit.take(), state.stdin.take_drain())
        };
        // A pending drain can never fire now; dropping it wakes `Stdin::send`.
        drop(drain);

        if let Some(handler) = handler {
            handler(code);
        }
        self.inner.exit_tx.send_replace(Some(code));
    }

    fn handle_start(&self, native: Arc<dyn NativeProcess>) {
        let pid = native.pid();
        let action = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Starting {
                warn!(pid, phase = ?state.phase, "Ignoring unexpected start notification");
                return;
            }
            state.phase = Phase::Running;
            state.native = Some(native.clone());
            state.stdin.on_start()
        };

        debug!(pid, "Process running");
        action.apply(&*native);

        let process = self.clone();
        self.inner.schedule(move || process.fire_started());
    }

    fn handle_output(&self, source: OutputSource, chunk: &[u8], closed: bool) {
        if self.phase() == Phase::Exited {
            debug!(stream = source.as_str(), "Dropping output after exit");
            return;
        }
        let stream = self.output(source);
        if !chunk.is_empty() {
            stream.deliver(Bytes::copy_from_slice(chunk));
        }
        if closed {
            stream.mark_closed();
        }
    }

    fn handle_exit(&self, code: i32) {
        let early = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Exited {
                return;
            }
            let early = state.native.take().is_none();
            state.phase = Phase::Exited;
            state.stdin.on_exit();
            early
        };

        if early {
            debug!(code, "Process exited before starting");
        } else {
            debug!(code, "Process exited");
        }

        let process = self.clone();
        self.inner.schedule(move || {
            if early {
                process.fire_started();
            }
            process.fire_exit(code);
        });
    }
}

/// Routes native callbacks into the process.
struct NativeBridge {
    process: Process,
}

impl NativeHandler for NativeBridge {
    fn on_pre_start(&self) {
        debug!("Process about to spawn");
    }

    fn on_start(&self, native: Arc<dyn NativeProcess>) {
        self.process.handle_start(native);
    }

    fn on_stdout(&self, chunk: &[u8], closed: bool) {
        self.process.handle_output(OutputSource::Stdout, chunk, closed);
    }

    fn on_stderr(&self, chunk: &[u8], closed: bool) {
        self.process.handle_output(OutputSource::Stderr, chunk, closed);
    }

    fn on_output_error(&self, source: OutputSource, error: std::io::Error) {
        self.process.output(source).fail(error);
    }

    fn on_stdin_ready(&self, buffer: &mut BytesMut, capacity: usize) -> bool {
        stdin::on_stdin_ready(&self.process.inner, buffer, capacity)
    }

    fn on_exit(&self, code: i32) {
        self.process.handle_exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::{pull, MockLauncher, MockProcess, NativeCall};
    use crate::native::SPAWN_FAILURE_EXIT_CODE;
    use crate::stdin::StdinStatus;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn mock_process(max_size: usize) -> (Process, MockLauncher) {
        let launcher = MockLauncher::default();
        let process = Process::builder(SpawnRequest::new("mock").arg("-x"))
            .write_queue_max_size(max_size)
            .launcher(launcher.clone())
            .build();
        (process, launcher)
    }

    async fn started(max_size: usize) -> (Process, MockLauncher, Arc<MockProcess>) {
        let (process, launcher) = mock_process(max_size);
        process.start().unwrap();
        process.context().flush().await.unwrap();

        let native = MockProcess::new(42);
        launcher.handler().on_start(native.clone());
        process.context().flush().await.unwrap();
        (process, launcher, native)
    }

    fn recorder() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (process, launcher) = mock_process(1024);
        process.start().unwrap();
        assert!(matches!(process.start(), Err(ProcessError::AlreadyStarted)));

        process.context().flush().await.unwrap();
        assert_eq!(launcher.starts(), 1);
        assert_eq!(launcher.request().unwrap().args, vec!["-x"]);
        assert_eq!(process.phase(), Phase::Starting);
    }

    #[tokio::test]
    async fn test_start_callback_after_native_start() {
        let (process, launcher) = mock_process(1024);
        let events = recorder();

        let ev = events.clone();
        process
            .start_with(move |p| ev.lock().unwrap().push(format!("started:{:?}", p.pid())))
            .unwrap();
        process.context().flush().await.unwrap();
        assert!(events.lock().unwrap().is_empty());

        launcher.handler().on_pre_start();
        launcher.handler().on_start(MockProcess::new(7));
        process.context().flush().await.unwrap();

        assert_eq!(*events.lock().unwrap(), vec!["started:Some(7)"]);
        assert_eq!(process.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn test_writes_before_start_are_queued() {
        let (process, launcher) = mock_process(1024);
        let stdin = process.stdin();
        stdin.write("abc").unwrap();
        stdin.write(vec![b'd'; 5]).unwrap();
        stdin.write(Bytes::from_static(b"efgh")).unwrap();
        assert_eq!(stdin.pending_bytes(), 12);

        process.start().unwrap();
        process.context().flush().await.unwrap();
        let native = MockProcess::new(1);
        launcher.handler().on_start(native.clone());

        assert_eq!(stdin.pending_bytes(), 12);
        assert_eq!(native.calls(), vec![NativeCall::WantWrite]);

        let (bytes, more) = pull(&*launcher.handler(), 64);
        assert_eq!(bytes, b"abcdddddefgh");
        assert!(!more);
        assert_eq!(stdin.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn test_write_requests_readiness_once_per_burst() {
        let (process, launcher, native) = started(1024).await;
        let stdin = process.stdin();

        stdin.write("a").unwrap();
        stdin.write("b").unwrap();
        assert_eq!(native.count(NativeCall::WantWrite), 1);

        let (bytes, more) = pull(&*launcher.handler(), 1);
        assert_eq!(bytes, b"a");
        assert!(more);
        stdin.write("c").unwrap();
        assert_eq!(native.count(NativeCall::WantWrite), 1);

        let (bytes, more) = pull(&*launcher.handler(), 64);
        assert_eq!(bytes, b"bc");
        assert!(!more);

        stdin.write("d").unwrap();
        assert_eq!(native.count(NativeCall::WantWrite), 2);
    }

    #[tokio::test]
    async fn test_close_with_empty_queue_closes_once() {
        let (process, _launcher, native) = started(1024).await;
        let stdin = process.stdin();

        stdin.close().unwrap();
        stdin.close().unwrap();

        assert_eq!(stdin.status(), StdinStatus::Closed);
        assert_eq!(native.count(NativeCall::CloseStdin(false)), 1);
    }

    #[tokio::test]
    async fn test_close_with_pending_defers_native_close() {
        let (process, launcher, native) = started(1024).await;
        let stdin = process.stdin();

        stdin.write("abcdef").unwrap();
        stdin.close().unwrap();
        assert_eq!(stdin.status(), StdinStatus::Closing);
        assert_eq!(native.count(NativeCall::CloseStdin(false)), 0);

        let (_, more) = pull(&*launcher.handler(), 4);
        assert!(more);
        assert_eq!(native.count(NativeCall::CloseStdin(false)), 0);

        let (bytes, more) = pull(&*launcher.handler(), 4);
        assert_eq!(bytes, b"ef");
        assert!(!more);
        assert_eq!(stdin.status(), StdinStatus::Closed);
        assert_eq!(native.count(NativeCall::CloseStdin(false)), 1);
    }

    #[tokio::test]
    async fn test_close_before_start_closes_after_flush() {
        let (process, launcher) = mock_process(1024);
        let stdin = process.stdin();
        stdin.write("xyz").unwrap();
        stdin.close().unwrap();
        assert_eq!(stdin.status(), StdinStatus::Closing);

        process.start().unwrap();
        process.context().flush().await.unwrap();
        let native = MockProcess::new(3);
        launcher.handler().on_start(native.clone());
        assert!(stdin.write("more").is_err());

        let (bytes, more) = pull(&*launcher.handler(), 64);
        assert_eq!(bytes, b"xyz");
        assert!(!more);
        assert_eq!(
            native.calls(),
            vec![NativeCall::WantWrite, NativeCall::CloseStdin(false)]
        );
    }

    #[tokio::test]
    async fn test_write_after_close_fails_in_any_phase() {
        let (process, _launcher) = mock_process(1024);
        process.stdin().close().unwrap();
        assert!(matches!(
            process.stdin().write("x"),
            Err(ProcessError::InvalidState(_))
        ));

        let (process, _launcher, _native) = started(1024).await;
        process.stdin().close().unwrap();
        assert!(matches!(
            process.stdin().write("x"),
            Err(ProcessError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_drain_handler_hysteresis() {
        let (process, launcher, _native) = started(1024).await;
        let stdin = process.stdin();
        let drains = Arc::new(StdMutex::new(0));

        stdin.write(vec![0u8; 1025]).unwrap();
        assert!(stdin.write_queue_full());

        let d = drains.clone();
        stdin.drain_handler(move || *d.lock().unwrap() += 1);
        process.context().flush().await.unwrap();
        assert_eq!(*drains.lock().unwrap(), 0);

        pull(&*launcher.handler(), 1);
        process.context().flush().await.unwrap();
        assert!(!stdin.write_queue_full());
        assert_eq!(*drains.lock().unwrap(), 0);

        pull(&*launcher.handler(), 512);
        process.context().flush().await.unwrap();
        assert_eq!(stdin.pending_bytes(), 512);
        assert_eq!(*drains.lock().unwrap(), 1);

        pull(&*launcher.handler(), 512);
        process.context().flush().await.unwrap();
        assert_eq!(*drains.lock().unwrap(), 1);

        let d = drains.clone();
        stdin.drain_handler(move || *d.lock().unwrap() += 1);
        process.context().flush().await.unwrap();
        assert_eq!(*drains.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_early_failure_reports_start_then_exit() {
        let (process, launcher) = mock_process(1024);
        let events = recorder();

        let ev = events.clone();
        process.stdout().handler(move |_| ev.lock().unwrap().push("stdout".into()));
        let ev = events.clone();
        process.exit_handler(move |code| ev.lock().unwrap().push(format!("exit:{code}")));
        let ev = events.clone();
        process
            .start_with(move |_| ev.lock().unwrap().push("started".into()))
            .unwrap();
        process.context().flush().await.unwrap();

        launcher.handler().on_exit(SPAWN_FAILURE_EXIT_CODE);
        let code = process.wait().await.unwrap();

        assert_eq!(code, SPAWN_FAILURE_EXIT_CODE);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["started".to_string(), format!("exit:{SPAWN_FAILURE_EXIT_CODE}")]
        );
        assert_eq!(process.pid(), None);
        assert!(!process.is_running());
        assert_eq!(process.phase(), Phase::Exited);
    }

    #[tokio::test]
    async fn test_exit_is_terminal() {
        let (process, launcher, native) = started(1024).await;
        let events = recorder();

        let ev = events.clone();
        process.stdout().handler(move |chunk| {
            ev.lock()
                .unwrap()
                .push(String::from_utf8_lossy(&chunk).into_owned())
        });
        let ev = events.clone();
        process.exit_handler(move |code| ev.lock().unwrap().push(format!("exit:{code}")));

        assert_eq!(process.pid(), Some(42));
        assert!(process.is_running());

        let handler = launcher.handler();
        handler.on_stdout(b"out", false);
        handler.on_stdout(&[], true);
        native.set_running(false);
        handler.on_exit(0);
        handler.on_stdout(b"late", false);
        handler.on_exit(1);

        assert_eq!(process.wait().await.unwrap(), 0);
        assert_eq!(process.exit_code(), Some(0));
        assert_eq!(*events.lock().unwrap(), vec!["out", "exit:0"]);
        assert_eq!(process.pid(), None);
        assert!(!process.is_running());
        assert_eq!(process.stdin().status(), StdinStatus::Closed);

        let fired = Arc::new(StdMutex::new(false));
        let f = fired.clone();
        process.stdin().drain_handler(move || *f.lock().unwrap() = true);
        process.context().flush().await.unwrap();
        assert!(!*fired.lock().unwrap());
    }

    #[tokio::test]
    async fn test_kill_only_while_running() {
        let (process, launcher) = mock_process(1024);
        process.kill();
        process.start().unwrap();
        process.kill_with(true);
        process.context().flush().await.unwrap();

        let native = MockProcess::new(9);
        launcher.handler().on_start(native.clone());
        process.kill();
        process.kill_with(true);
        assert_eq!(
            native.calls(),
            vec![NativeCall::Destroy(false), NativeCall::Destroy(true)]
        );

        launcher.handler().on_exit(137);
        process.kill();
        assert_eq!(native.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_output_error_reaches_stream() {
        let (process, launcher, _native) = started(1024).await;
        let errors = recorder();

        let ev = errors.clone();
        process
            .stderr()
            .exception_handler(move |e| ev.lock().unwrap().push(e.to_string()));
        launcher.handler().on_output_error(
            OutputSource::Stderr,
            std::io::Error::new(std::io::ErrorKind::Other, "read failed"),
        );
        process.context().flush().await.unwrap();

        assert_eq!(*errors.lock().unwrap(), vec!["read failed"]);
    }

    #[tokio::test]
    async fn test_send_waits_for_drain() {
        let (process, launcher, _native) = started(4).await;
        let stdin = process.stdin();

        let sender = tokio::spawn(async move { stdin.send("abcdefgh").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sender.is_finished());

        let (bytes, _) = pull(&*launcher.handler(), 64);
        assert_eq!(bytes, b"abcdefgh");

        let result = tokio::time::timeout(Duration::from_secs(1), sender)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_fails_when_process_exits() {
        let (process, launcher, _native) = started(4).await;
        let stdin = process.stdin();

        let sender = tokio::spawn(async move { stdin.send("abcdefgh").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        launcher.handler().on_exit(1);

        let result = tokio::time::timeout(Duration::from_secs(1), sender)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ProcessError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_drain_handler_after_exit_is_dropped() {
        let (process, launcher, _native) = started(4).await;
        let stdin = process.stdin();

        stdin.write("abcdefgh").unwrap();
        assert!(stdin.write_queue_full());
        launcher.handler().on_exit(1);
        assert_eq!(process.wait().await.unwrap(), 1);

        let (tx, rx) = oneshot::channel::<()>();
        stdin.drain_handler(move || {
            let _ = tx.send(());
        });

        let result = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap();
        assert!(result.is_err());
    }
}
