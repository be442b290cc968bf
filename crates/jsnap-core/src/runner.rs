//! External command execution with timeout and forced termination.
//!
//! Every OS-level capture (top, vmstat, netstat, jcmd, custom scripts)
//! goes through this runner. It provides:
//!
//! - per-command timeout with SIGTERM → SIGKILL escalation
//! - combined stdout+stderr capture with an output size cap
//! - direct-to-file execution for artifact-producing commands
//! - a shared pid handle so a task's `kill()`/`interrupt()` can signal
//!   the command from another thread

use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Default timeout per command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum captured output size (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL.
const SIGTERM_GRACE: Duration = Duration::from_millis(500);

/// Poll interval while waiting on a child.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Errors that can occur during command execution.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handle to the pid of a currently running command.
///
/// A capture task stores one of these; `kill()`/`interrupt()` read it
/// from another thread to signal the child. Cleared when the command
/// finishes, so late signals hit nothing.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandle {
    pid: Arc<Mutex<Option<u32>>>,
}

impl ProcessHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, pid: u32) {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner()) = Some(pid);
    }

    fn clear(&self) {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Best-effort SIGKILL of the underlying process, if any.
    pub fn kill(&self) {
        if let Some(pid) = *self.pid.lock().unwrap_or_else(|e| e.into_inner()) {
            signal(pid, Signal::Kill);
        }
    }

    /// Best-effort SIGINT of the underlying process, if any.
    pub fn interrupt(&self) {
        if let Some(pid) = *self.pid.lock().unwrap_or_else(|e| e.into_inner()) {
            signal(pid, Signal::Interrupt);
        }
    }
}

enum Signal {
    Terminate,
    Kill,
    Interrupt,
}

#[cfg(unix)]
fn signal(pid: u32, sig: Signal) {
    let signum = match sig {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
        Signal::Interrupt => libc::SIGINT,
    };
    unsafe {
        libc::kill(pid as libc::pid_t, signum);
    }
}

#[cfg(not(unix))]
fn signal(_pid: u32, _sig: Signal) {}

/// Command runner with a fixed timeout and output cap.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    max_output_bytes: usize,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_max_output(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command, capturing stdout and stderr into one buffer.
    ///
    /// Returns the combined output even on non-zero exit; callers that
    /// care about failure markers scan the bytes themselves. A timeout
    /// kills the process and surfaces as an error.
    pub fn run_combined_output(
        &self,
        command: &str,
        args: &[&str],
        handle: Option<&ProcessHandle>,
    ) -> Result<Vec<u8>, RunnerError> {
        debug!(command, ?args, "running command");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let out_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(ref mut out) = stdout {
                use std::io::Read;
                let _ = out.read_to_end(&mut buf);
            }
            buf
        });
        let err_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(ref mut err) = stderr {
                use std::io::Read;
                let _ = err.read_to_end(&mut buf);
            }
            buf
        });

        let waited = self.wait_with_deadline(command, &mut child, handle);

        let mut combined = out_reader.join().unwrap_or_default();
        let trailer = err_reader.join().unwrap_or_default();
        combined.extend_from_slice(&trailer);
        if combined.len() > self.max_output_bytes {
            warn!(
                command,
                len = combined.len(),
                cap = self.max_output_bytes,
                "output truncated"
            );
            combined.truncate(self.max_output_bytes);
        }

        waited?;
        Ok(combined)
    }

    /// Run a command with stdout and stderr redirected into `dest`.
    ///
    /// The file carries interleaved output the way a shell `>file 2>&1`
    /// redirection would.
    pub fn run_to_file(
        &self,
        command: &str,
        args: &[&str],
        dest: &Path,
        handle: Option<&ProcessHandle>,
    ) -> Result<(), RunnerError> {
        debug!(command, ?args, dest = %dest.display(), "running command to file");
        let out = File::create(dest)?;
        let err = out.try_clone()?;
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        self.wait_with_deadline(command, &mut child, handle)
    }

    fn wait_with_deadline(
        &self,
        command: &str,
        child: &mut Child,
        handle: Option<&ProcessHandle>,
    ) -> Result<(), RunnerError> {
        if let Some(handle) = handle {
            handle.set(child.id());
        }
        let deadline = Instant::now() + self.timeout;
        let result = loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(command, code = ?status.code(), "command exited");
                    break Ok(());
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!(command, timeout_secs = self.timeout.as_secs(), "command timed out");
                        kill_with_grace(child);
                        break Err(RunnerError::Timeout {
                            command: command.to_string(),
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(e) => break Err(RunnerError::Io(e)),
            }
        };
        if let Some(handle) = handle {
            handle.clear();
        }
        result
    }
}

/// Kill a child with SIGTERM, escalating to SIGKILL after a grace period.
fn kill_with_grace(child: &mut Child) {
    signal(child.id(), Signal::Terminate);
    thread::sleep(SIGTERM_GRACE);
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            signal(child.id(), Signal::Kill);
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_carries_stdout_and_stderr() {
        let runner = CommandRunner::default();
        let output = runner
            .run_combined_output("sh", &["-c", "echo out; echo err >&2"], None)
            .unwrap();
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[test]
    fn output_is_capped() {
        let runner = CommandRunner::default().with_max_output(64);
        let output = runner
            .run_combined_output("sh", &["-c", "yes | head -n 1000"], None)
            .unwrap();
        assert_eq!(output.len(), 64);
    }

    #[test]
    fn spawn_failure_names_the_command() {
        let runner = CommandRunner::default();
        let err = runner
            .run_combined_output("/no/such/binary", &[], None)
            .unwrap_err();
        assert!(err.to_string().contains("/no/such/binary"));
    }

    #[test]
    fn timeout_kills_and_reports() {
        let runner = CommandRunner::new(Duration::from_millis(100));
        let started = Instant::now();
        let err = runner
            .run_combined_output("sleep", &["30"], None)
            .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn run_to_file_writes_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("echo.out");
        let runner = CommandRunner::default();
        runner
            .run_to_file("sh", &["-c", "echo hello"], &dest, None)
            .unwrap();
        let content = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(content.trim(), "hello");
    }

    #[test]
    fn handle_is_cleared_after_completion() {
        let runner = CommandRunner::default();
        let handle = ProcessHandle::new();
        runner
            .run_combined_output("true", &[], Some(&handle))
            .unwrap();
        // A kill after completion must be a no-op.
        handle.kill();
    }
}
