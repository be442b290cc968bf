//! Target-process introspection.
//!
//! Narrow boundary consumed by GC-log discovery: read a process's
//! command line and (where the platform allows it) its current working
//! directory. Linux reads `/proc` directly; other Unix platforms fall
//! back to `ps` for the command line and report working-directory
//! introspection as unavailable.

use jsnap_common::{Error, Result};
use std::path::PathBuf;

/// Read the full command line of a process.
#[cfg(target_os = "linux")]
pub fn command_line_of(pid: u32) -> Result<String> {
    let raw = std::fs::read(format!("/proc/{pid}/cmdline"))
        .map_err(|_| Error::ProcessNotFound { pid })?;
    if raw.is_empty() {
        return Err(Error::ProcessNotFound { pid });
    }
    // Arguments are NUL-separated; the last byte is a trailing NUL.
    let joined: Vec<u8> = raw
        .iter()
        .map(|&byte| if byte == 0 { b' ' } else { byte })
        .collect();
    Ok(String::from_utf8_lossy(&joined).trim_end().to_string())
}

/// Read the full command line of a process.
#[cfg(not(target_os = "linux"))]
pub fn command_line_of(pid: u32) -> Result<String> {
    let output = std::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "command="])
        .output()
        .map_err(|e| Error::Command(format!("ps failed: {e}")))?;
    let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || line.is_empty() {
        return Err(Error::ProcessNotFound { pid });
    }
    Ok(line)
}

/// Read the current working directory of a process.
///
/// POSIX-only capability; on Linux this resolves `/proc/<pid>/cwd`.
/// Platforms without the capability report it as unavailable so callers
/// can degrade (relative GC-log paths stay relative with a warning).
#[cfg(target_os = "linux")]
pub fn working_dir_of(pid: u32) -> Result<PathBuf> {
    std::fs::read_link(format!("/proc/{pid}/cwd")).map_err(|e| {
        Error::IntrospectionUnavailable(format!("cannot resolve cwd of pid {pid}: {e}"))
    })
}

/// Read the current working directory of a process.
#[cfg(not(target_os = "linux"))]
pub fn working_dir_of(pid: u32) -> Result<PathBuf> {
    Err(Error::IntrospectionUnavailable(format!(
        "working directory of pid {pid} cannot be read on this platform"
    )))
}

/// Whether a process is currently alive.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    // Signal 0 probes existence without delivering anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}
