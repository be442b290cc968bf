//! Capture task model and execution.
//!
//! Each diagnostic artifact is produced by one [`Task`]. Tasks run on
//! their own OS thread (thread-per-task; blocking I/O and subprocess
//! waits are safe) and deliver exactly one [`CaptureResult`] through a
//! one-shot channel. Tasks write to disjoint files and have no required
//! execution order; the only cross-task synchronization is the
//! [`Gate`] used by the two-phase netstat snapshot and the process-wide
//! run lock.

pub mod aggregate;
pub mod attach;
pub mod follow;
pub mod gclog;
pub mod tail;
pub mod tasks;

use crate::runner::ProcessHandle;
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, error};

/// Outcome of one capture operation.
///
/// `ok == false` never aborts the run; it only marks this artifact as
/// unusable.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub message: String,
    pub ok: bool,
}

impl CaptureResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ok: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ok: false,
        }
    }
}

/// One capture operation.
///
/// `run()` may block on subprocess completion or a [`Gate`];
/// `kill()`/`interrupt()` are advisory signals to an underlying
/// external process — `run()` is expected to observe them and return
/// promptly, but this is not guaranteed.
pub trait Task: Send {
    /// Artifact kind shown in the per-task report line.
    fn kind(&self) -> &'static str;

    fn set_endpoint(&mut self, url: &str);

    fn run(&mut self) -> jsnap_common::Result<CaptureResult>;

    fn kill(&self) {}

    fn interrupt(&self) {}
}

/// Shared endpoint/signal plumbing embedded by concrete tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskBase {
    endpoint: String,
    handle: ProcessHandle,
}

impl TaskBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_endpoint(&mut self, url: &str) {
        self.endpoint = url.to_string();
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn kill(&self) {
        self.handle.kill();
    }

    pub fn interrupt(&self) {
        self.handle.interrupt();
    }
}

/// Adapt a task into the single-result function the spawner runs: set
/// the endpoint, run, and convert an error into a failed result so the
/// channel always carries exactly one value.
pub fn wrap_run(endpoint: &str, task: &mut dyn Task) -> CaptureResult {
    task.set_endpoint(endpoint);
    match task.run() {
        Ok(result) => result,
        Err(e) => {
            error!(kind = task.kind(), error = %e, "capture task failed");
            CaptureResult::failure(format!("{} capture failed: {e}", task.kind()))
        }
    }
}

/// Start a capture task on its own thread.
///
/// Returns a one-shot receiver. Contract for consumers: receive exactly
/// once per returned channel; receives across different channels may
/// happen in any order. The sender is dropped after the single send, so
/// a second receive would report disconnection rather than block.
pub fn spawn_capture(endpoint: &str, mut task: Box<dyn Task>) -> Receiver<CaptureResult> {
    let (tx, rx) = sync_channel(1);
    let endpoint = endpoint.to_string();
    let kind = task.kind();
    thread::spawn(move || {
        debug!(kind, "capture task started");
        let result = wrap_run(&endpoint, task.as_mut());
        // The receiver may already be gone on shutdown; nothing to do.
        let _ = tx.send(result);
    });
    rx
}

/// A reusable open/wait gate.
///
/// Used by the two-phase netstat capture: the task takes its first
/// snapshot, waits on the gate, and takes the second snapshot once the
/// run driver opens it. Opening before the wait is fine; the waiter
/// returns immediately.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<bool>,
    signal: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate, releasing current and future waiters.
    pub fn open(&self) {
        let mut opened = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *opened = true;
        self.signal.notify_all();
    }

    /// Wait until the gate opens or `timeout` elapses.
    ///
    /// Returns `true` when the gate was opened. The timeout keeps a
    /// task from hanging forever if the driver never triggers.
    pub fn wait(&self, timeout: std::time::Duration) -> bool {
        let opened = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (opened, _result) = self
            .signal
            .wait_timeout_while(opened, timeout, |opened| !*opened)
            .unwrap_or_else(|e| e.into_inner());
        *opened
    }
}

/// Acquire the process-wide run lock.
///
/// At most one full capture run executes at a time: a run changes the
/// process's working directory to its per-run output directory, and
/// concurrent runs would corrupt each other's relative paths. Runs are
/// infrequent, so serialization is acceptable.
pub fn lock_run() -> MutexGuard<'static, ()> {
    static RUN_LOCK: Mutex<()> = Mutex::new(());
    RUN_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    struct StubTask {
        kind: &'static str,
        outcome: Option<jsnap_common::Result<CaptureResult>>,
        seen_endpoint: String,
    }

    impl StubTask {
        fn ok(kind: &'static str, message: &str) -> Box<Self> {
            Box::new(Self {
                kind,
                outcome: Some(Ok(CaptureResult::success(message))),
                seen_endpoint: String::new(),
            })
        }

        fn err(kind: &'static str, message: &str) -> Box<Self> {
            Box::new(Self {
                kind,
                outcome: Some(Err(jsnap_common::Error::Capture(message.to_string()))),
                seen_endpoint: String::new(),
            })
        }
    }

    impl Task for StubTask {
        fn kind(&self) -> &'static str {
            self.kind
        }

        fn set_endpoint(&mut self, url: &str) {
            self.seen_endpoint = url.to_string();
        }

        fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
            assert!(!self.seen_endpoint.is_empty(), "endpoint set before run");
            self.outcome.take().expect("run called exactly once")
        }
    }

    #[test]
    fn spawned_task_delivers_exactly_one_result() {
        let rx = spawn_capture("http://server", StubTask::ok("top", "captured"));
        let result = rx.recv().unwrap();
        assert!(result.ok);
        assert_eq!(result.message, "captured");
        // The sender is gone after the single send.
        assert!(rx.recv().is_err());
    }

    #[test]
    fn task_error_becomes_failed_result() {
        let rx = spawn_capture("http://server", StubTask::err("gc", "disk on fire"));
        let result = rx.recv().unwrap();
        assert!(!result.ok);
        assert!(result.message.contains("gc capture failed"));
        assert!(result.message.contains("disk on fire"));
    }

    #[test]
    fn results_can_be_joined_in_any_order() {
        let rx_a = spawn_capture("http://server", StubTask::ok("a", "first"));
        let rx_b = spawn_capture("http://server", StubTask::ok("b", "second"));
        // Join in reverse spawn order.
        assert_eq!(rx_b.recv().unwrap().message, "second");
        assert_eq!(rx_a.recv().unwrap().message, "first");
    }

    #[test]
    fn gate_releases_waiter() {
        let gate = Arc::new(Gate::new());
        let waiter_gate = Arc::clone(&gate);
        let waiter =
            thread::spawn(move || waiter_gate.wait(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        gate.open();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn gate_opened_before_wait_returns_immediately() {
        let gate = Gate::new();
        gate.open();
        assert!(gate.wait(Duration::from_millis(1)));
    }

    #[test]
    fn gate_times_out_when_never_opened() {
        let gate = Gate::new();
        assert!(!gate.wait(Duration::from_millis(10)));
    }

    #[test]
    fn run_lock_serializes() {
        let guard = lock_run();
        let contender = thread::spawn(|| {
            let _guard = lock_run();
        });
        thread::sleep(Duration::from_millis(10));
        assert!(!contender.is_finished());
        drop(guard);
        contender.join().unwrap();
    }
}
