//! jsnap core — capture orchestration for JVM diagnostic snapshots.
//!
//! On trigger (one-shot run, M3 periodic tick, or an external request)
//! the engine gathers OS- and JVM-level diagnostic artifacts into a
//! per-run directory and uploads each artifact to an analysis endpoint.
//!
//! Module map:
//! - [`capture`] — the Task model, tail positioning, incremental log
//!   following, GC-log resolution, the privileged capture chain, and
//!   the concrete capture tasks
//! - [`run`] — the full-run driver (fan out, join, report)
//! - [`m3`] — the continuous-monitoring loop
//! - [`upload`] — the upload boundary contract and HTTP implementation
//! - [`runner`] — external command execution with timeout/kill
//! - [`proc`] — target-process introspection
//! - [`fsglob`] — wildcard expansion for log path patterns

pub mod capture;
pub mod fsglob;
pub mod logging;
pub mod m3;
pub mod proc;
pub mod run;
pub mod runner;
pub mod upload;
