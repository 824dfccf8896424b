//! Scripted native layer for tests.
//!
//! The launcher only records the handler; tests then drive the lifecycle by
//! calling the handler's callbacks directly, in whatever order they need.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use super::{NativeHandler, NativeLauncher, NativeProcess};
use crate::config::ProcessConfig;
use crate::spawn::SpawnRequest;

#[derive(Clone, Default)]
pub(crate) struct MockLauncher {
    launched: Arc<Mutex<Launched>>,
}

#[derive(Default)]
struct Launched {
    handler: Option<Arc<dyn NativeHandler>>,
    request: Option<SpawnRequest>,
    starts: usize,
}

impl MockLauncher {
    pub(crate) fn handler(&self) -> Arc<dyn NativeHandler> {
        self.launched
            .lock()
            .handler
            .clone()
            .expect("launcher was not started")
    }

    pub(crate) fn request(&self) -> Option<SpawnRequest> {
        self.launched.lock().request.clone()
    }

    pub(crate) fn starts(&self) -> usize {
        self.launched.lock().starts
    }
}

impl NativeLauncher for MockLauncher {
    fn start(
        &self,
        request: SpawnRequest,
        _config: &ProcessConfig,
        handler: Arc<dyn NativeHandler>,
    ) {
        let mut launched = self.launched.lock();
        launched.handler = Some(handler);
        launched.request = Some(request);
        launched.starts += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeCall {
    WantWrite,
    CloseStdin(bool),
    Destroy(bool),
}

pub(crate) struct MockProcess {
    pid: u32,
    running: AtomicBool,
    calls: Mutex<Vec<NativeCall>>,
}

impl MockProcess {
    pub(crate) fn new(pid: u32) -> Arc<Self> {
        Arc::new(Self {
            pid,
            running: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, call: NativeCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

impl NativeProcess for MockProcess {
    fn want_write(&self) {
        self.calls.lock().push(NativeCall::WantWrite);
    }

    fn close_stdin(&self, force: bool) {
        self.calls.lock().push(NativeCall::CloseStdin(force));
    }

    fn destroy(&self, force: bool) {
        self.calls.lock().push(NativeCall::Destroy(force));
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Run one write-readiness round with the given capacity.
pub(crate) fn pull(handler: &dyn NativeHandler, capacity: usize) -> (Vec<u8>, bool) {
    let mut buf = BytesMut::with_capacity(capacity);
    let more = handler.on_stdin_ready(&mut buf, capacity);
    (buf.to_vec(), more)
}
