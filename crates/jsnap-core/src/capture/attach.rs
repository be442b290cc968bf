//! Privileged capture fallback chain.
//!
//! Heap dumps, class histograms, VM flag dumps, and jstat sampling may
//! all fail under restrictive environments (container users, SELinux,
//! noexec install paths). Each such capture walks an ordered fallback
//! chain:
//!
//! 1. the primary JDK tool against the target pid
//! 2. the agent's own executable re-invoked in attach mode, pid passed
//!    through an environment-variable hook
//! 3. a copy of the executable in a neutral temp location, retried in
//!    attach mode (some environments forbid executing the install path)
//! 4. heap dump only: chown the produced-but-unreadable output to the
//!    current user and retry opening it
//!
//! Each tier's error wraps the previous one so the final failure shows
//! the whole attempted chain.

use crate::runner::CommandRunner;
use jsnap_common::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment-variable hook carrying the target pid into attach mode.
pub const ATTACH_PID_ENV: &str = "JSNAP_ATTACH_PID";

/// Environment-variable hook carrying the requested operation.
pub const ATTACH_OP_ENV: &str = "JSNAP_ATTACH_OP";

/// Environment-variable hook carrying the diagnostic tool to invoke.
pub const ATTACH_TOOL_ENV: &str = "JSNAP_ATTACH_TOOL";

/// Environment-variable hook carrying the command timeout in seconds,
/// so a long-deadline capture (heap dump) keeps its deadline when the
/// chain re-invokes the agent.
pub const ATTACH_TIMEOUT_ENV: &str = "JSNAP_ATTACH_TIMEOUT_SECS";

/// Output substrings that mark a tier as failed even on zero exit.
const FAILURE_MARKERS: &[&str] = &["No such file", "Permission denied"];

/// Privileged operations routed through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOp {
    ThreadDump,
    HeapDump,
    Histogram,
    VmFlags,
    Jstat,
}

impl AttachOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachOp::ThreadDump => "threaddump",
            AttachOp::HeapDump => "heapdump",
            AttachOp::Histogram => "histogram",
            AttachOp::VmFlags => "vmflags",
            AttachOp::Jstat => "jstat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "threaddump" => Some(AttachOp::ThreadDump),
            "heapdump" => Some(AttachOp::HeapDump),
            "histogram" => Some(AttachOp::Histogram),
            "vmflags" => Some(AttachOp::VmFlags),
            "jstat" => Some(AttachOp::Jstat),
            _ => None,
        }
    }

    /// jcmd subcommand and arguments for this operation. The heap dump
    /// takes the destination path as a trailing argument.
    fn tool_args(&self, dest: Option<&Path>) -> Vec<String> {
        match self {
            AttachOp::ThreadDump => vec!["Thread.print".into(), "-l".into()],
            AttachOp::HeapDump => {
                let mut args = vec!["GC.heap_dump".into()];
                if let Some(dest) = dest {
                    args.push(dest.display().to_string());
                }
                args
            }
            AttachOp::Histogram => vec!["GC.class_histogram".into()],
            AttachOp::VmFlags => vec!["VM.flags".into(), "-all".into()],
            AttachOp::Jstat => vec!["PerfCounter.print".into()],
        }
    }
}

impl std::fmt::Display for AttachOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold the collected per-tier errors into the exhaustion error, oldest
/// tier first, so the final failure shows the whole attempted chain.
fn chain_failure(errors: Vec<String>) -> Error {
    Error::AttachExhausted(errors.join(" <- "))
}

/// Whether tool output carries a known failure marker.
fn output_failed(output: &[u8]) -> bool {
    let text = String::from_utf8_lossy(output);
    FAILURE_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Some tools substitute the output path (for example when the target
/// JVM's user cannot write the requested location). Parse the reported
/// path out of the output; it supersedes the requested one downstream.
fn reported_path(output: &[u8]) -> Option<PathBuf> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?:Dumping heap to|Heap dump file created at|dump written to)\s+([^\s,]+)")
            .expect("static regex")
    });
    let text = String::from_utf8_lossy(output);
    re.captures(&text)
        .map(|caps| PathBuf::from(caps[1].trim_end_matches('.')))
}

/// The fallback chain for one target process.
pub struct AttachChain<'a> {
    runner: &'a CommandRunner,
    pid: u32,
    tool: String,
}

impl<'a> AttachChain<'a> {
    pub fn new(runner: &'a CommandRunner, pid: u32, tool: impl Into<String>) -> Self {
        Self {
            runner,
            pid,
            tool: tool.into(),
        }
    }

    /// Run `op`, writing output to `dest`.
    ///
    /// Returns the path actually holding the artifact, which differs
    /// from `dest` when the tool substituted its own output location.
    pub fn capture(&self, op: AttachOp, dest: &Path) -> Result<PathBuf> {
        let mut chain_errors: Vec<String> = Vec::new();

        match self.primary_tool(op, dest) {
            Ok(path) => return Ok(path),
            Err(e) => {
                debug!(op = %op, pid = self.pid, error = %e, "primary tool failed");
                chain_errors.push(format!("primary tool ({}): {e}", self.tool));
            }
        }

        let self_exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                // Already-collected tier errors must survive this path too.
                chain_errors.push(format!("cannot locate own executable: {e}"));
                return Err(chain_failure(chain_errors));
            }
        };
        match self.self_attach(&self_exe, op, dest) {
            Ok(path) => return Ok(path),
            Err(e) => {
                debug!(op = %op, pid = self.pid, error = %e, "self attach failed");
                chain_errors.push(format!("self attach: {e}"));
            }
        }

        match self.relocated_attach(&self_exe, op, dest) {
            Ok(path) => return Ok(path),
            Err(e) => {
                debug!(op = %op, pid = self.pid, error = %e, "relocated attach failed");
                chain_errors.push(format!("relocated attach: {e}"));
            }
        }

        if op == AttachOp::HeapDump {
            match self.reclaim_output(dest) {
                Ok(path) => return Ok(path),
                Err(e) => chain_errors.push(format!("output reclaim: {e}")),
            }
        }

        Err(chain_failure(chain_errors))
    }

    /// Tier 1: the primary JDK tool.
    fn primary_tool(&self, op: AttachOp, dest: &Path) -> Result<PathBuf> {
        let pid = self.pid.to_string();
        let op_args = op.tool_args(Some(dest));
        let mut args: Vec<&str> = vec![&pid];
        args.extend(op_args.iter().map(String::as_str));

        let output = self
            .runner
            .run_combined_output(&self.tool, &args, None)
            .map_err(|e| Error::Command(e.to_string()))?;
        self.finish_tier(op, dest, &output)
    }

    /// Tier 2/3: this agent's own executable in attach mode.
    fn self_attach(&self, exe: &Path, op: AttachOp, dest: &Path) -> Result<PathBuf> {
        let output = std::process::Command::new(exe)
            .env(ATTACH_PID_ENV, self.pid.to_string())
            .env(ATTACH_OP_ENV, op.as_str())
            .env(ATTACH_TOOL_ENV, &self.tool)
            .env(
                ATTACH_TIMEOUT_ENV,
                self.runner.timeout().as_secs().to_string(),
            )
            .arg("--attach-dest")
            .arg(dest)
            .output()
            .map_err(|e| Error::Command(format!("cannot re-invoke {}: {e}", exe.display())))?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        if !output.status.success() {
            return Err(Error::Command(format!(
                "attach mode exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&combined).trim()
            )));
        }
        self.finish_tier(op, dest, &combined)
    }

    /// Tier 3: copy the executable to a neutral temp location first.
    fn relocated_attach(&self, exe: &Path, op: AttachOp, dest: &Path) -> Result<PathBuf> {
        let temp_exe = std::env::temp_dir().join(format!("jsnap-attach-{}", std::process::id()));
        std::fs::copy(exe, &temp_exe)
            .map_err(|e| Error::Command(format!("cannot relocate executable: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&temp_exe, std::fs::Permissions::from_mode(0o755));
        }

        let result = self.self_attach(&temp_exe, op, dest);
        let _ = std::fs::remove_file(&temp_exe);
        result
    }

    /// Tier 4 (heap dump only): the dump may exist but be owned by the
    /// target JVM's user; take ownership and verify it opens.
    #[cfg(unix)]
    fn reclaim_output(&self, dest: &Path) -> Result<PathBuf> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(dest.as_os_str().as_bytes())
            .map_err(|_| Error::Capture(format!("path not representable: {}", dest.display())))?;
        let rc = unsafe { libc::chown(c_path.as_ptr(), libc::geteuid(), libc::getegid()) };
        if rc != 0 {
            return Err(Error::Capture(format!(
                "chown {} failed: {}",
                dest.display(),
                std::io::Error::last_os_error()
            )));
        }

        std::fs::File::open(dest)
            .map_err(|e| Error::Capture(format!("reclaimed output still unreadable: {e}")))?;
        info!(dest = %dest.display(), "heap dump reclaimed via chown");
        Ok(dest.to_path_buf())
    }

    #[cfg(not(unix))]
    fn reclaim_output(&self, dest: &Path) -> Result<PathBuf> {
        Err(Error::Capture(format!(
            "cannot reclaim {} on this platform",
            dest.display()
        )))
    }

    /// Shared tier epilogue: marker check, path substitution, and
    /// writing captured stdout to `dest` for operations whose tool does
    /// not write the file itself.
    fn finish_tier(&self, op: AttachOp, dest: &Path, output: &[u8]) -> Result<PathBuf> {
        if output_failed(output) {
            return Err(Error::Command(format!(
                "failure marker in output: {}",
                String::from_utf8_lossy(output)
                    .lines()
                    .find(|l| FAILURE_MARKERS.iter().any(|m| l.contains(m)))
                    .unwrap_or("")
                    .trim()
            )));
        }

        if let Some(substituted) = reported_path(output) {
            if substituted != dest {
                warn!(
                    requested = %dest.display(),
                    actual = %substituted.display(),
                    "tool substituted the output path"
                );
                return Ok(substituted);
            }
        }

        if op == AttachOp::HeapDump {
            // The tool writes the dump file itself.
            return Ok(dest.to_path_buf());
        }

        std::fs::write(dest, output)
            .map_err(|e| Error::Capture(format!("cannot write {}: {e}", dest.display())))?;
        Ok(dest.to_path_buf())
    }
}

/// Runner for attach mode, honoring the timeout hook set by the
/// invoking chain; defaults apply when the hook is absent or malformed.
pub fn attach_mode_runner() -> CommandRunner {
    std::env::var(ATTACH_TIMEOUT_ENV)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| CommandRunner::new(Duration::from_secs(secs)))
        .unwrap_or_default()
}

/// Entry point for the agent's internal attach mode.
///
/// Invoked when [`ATTACH_PID_ENV`] is set on startup: performs the
/// requested operation and writes the result to stdout (or to the
/// destination path for heap dumps), then exits. Tiers 2 and 3 of the
/// chain run through here.
pub fn run_attach_mode(runner: &CommandRunner, tool: &str) -> Result<()> {
    let pid: u32 = std::env::var(ATTACH_PID_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::Config(format!("{ATTACH_PID_ENV} is not a valid pid")))?;
    let op = std::env::var(ATTACH_OP_ENV)
        .ok()
        .and_then(|v| AttachOp::parse(&v))
        .ok_or_else(|| Error::Config(format!("{ATTACH_OP_ENV} is not a valid operation")))?;

    let dest: Option<PathBuf> = {
        let mut args = std::env::args().skip(1);
        let mut found = None;
        while let Some(arg) = args.next() {
            if arg == "--attach-dest" {
                found = args.next().map(PathBuf::from);
                break;
            }
        }
        found
    };

    let pid_string = pid.to_string();
    let op_args = op.tool_args(dest.as_deref());
    let mut args: Vec<&str> = vec![&pid_string];
    args.extend(op_args.iter().map(String::as_str));

    let output = runner
        .run_combined_output(tool, &args, None)
        .map_err(|e| Error::Command(e.to_string()))?;

    use std::io::Write;
    std::io::stdout().write_all(&output)?;
    Ok(())
}
