//! Error types for the jsnap agent.
//!
//! The taxonomy distinguishes four failure classes with different blast
//! radii:
//! - per-item recoverable failures inside a batch (one log file of many)
//! - fallback-exhausted failures of a privileged capture chain
//! - setup-fatal failures that abort a run before any task starts
//! - upload failures, which never invalidate already-captured data

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for jsnap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file or flag errors.
    Config,
    /// Artifact capture errors (commands, log copies).
    Capture,
    /// Target process introspection errors.
    Process,
    /// Privileged attach/dump chain errors.
    Attach,
    /// Upload transport errors.
    Upload,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Capture => write!(f, "capture"),
            ErrorCategory::Process => write!(f, "process"),
            ErrorCategory::Attach => write!(f, "attach"),
            ErrorCategory::Upload => write!(f, "upload"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for the jsnap agent.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("run setup failed: {0}")]
    Setup(String),

    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    #[error("process introspection unavailable: {0}")]
    IntrospectionUnavailable(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("command timed out after {seconds}s")]
    CommandTimeout { seconds: u64 },

    #[error("attach chain exhausted: {0}")]
    AttachExhausted(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::Capture(_) | Error::Setup(_) => ErrorCategory::Capture,
            Error::ProcessNotFound { .. } | Error::IntrospectionUnavailable(_) => {
                ErrorCategory::Process
            }
            Error::Command(_) | Error::CommandTimeout { .. } => ErrorCategory::Capture,
            Error::AttachExhausted(_) => ErrorCategory::Attach,
            Error::Upload(_) => ErrorCategory::Upload,
            Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether this error aborts a full capture run.
    ///
    /// Only setup failures are fatal; every other error marks a single
    /// artifact as unusable and the run continues.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(self, Error::Setup(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping() {
        assert_eq!(Error::Config("x".into()).category(), ErrorCategory::Config);
        assert_eq!(
            Error::ProcessNotFound { pid: 42 }.category(),
            ErrorCategory::Process
        );
        assert_eq!(
            Error::AttachExhausted("x".into()).category(),
            ErrorCategory::Attach
        );
        assert_eq!(Error::Upload("x".into()).category(), ErrorCategory::Upload);
    }

    #[test]
    fn only_setup_is_fatal() {
        assert!(Error::Setup("no cwd".into()).is_setup_fatal());
        assert!(!Error::Capture("one file".into()).is_setup_fatal());
        assert!(!Error::Upload("503".into()).is_setup_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::CommandTimeout { seconds: 30 };
        assert_eq!(err.to_string(), "command timed out after 30s");
    }
}
