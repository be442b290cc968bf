//! Full capture run driver.
//!
//! A run creates a per-run output directory, changes the process
//! working directory into it (guarded by the process-wide run lock),
//! fans the capture tasks out onto their own threads, opens the netstat
//! gate after the dwell period, joins every result channel exactly
//! once, and reports one fixed-template line per artifact.

use crate::capture::follow::LogFollower;
use crate::capture::tasks::{jvm, logs, script, system};
use crate::capture::{self, CaptureResult, Gate, Task};
use crate::upload::{self, Uploader};
use jsnap_common::{DataTag, Error, Result};
use jsnap_config::AgentConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Which tasks a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// On-demand snapshot: every artifact kind, including the heap dump.
    Full,
    /// M3 periodic tick: the cheap recurring set; no heap dump, no
    /// custom/extended scripts.
    Monitor,
}

/// Everything a run needs, owned by the caller so incremental-read
/// state survives across runs in continuous-monitoring mode.
pub struct RunContext {
    pub config: AgentConfig,
    pub uploader: Arc<dyn Uploader>,
    pub pid: Option<u32>,
    pub app_follower: Arc<Mutex<LogFollower>>,
    pub access_follower: Arc<Mutex<LogFollower>>,
    /// Delay before the netstat gate opens (between the two snapshots).
    pub netstat_dwell: Duration,
    /// Where per-run directories are created; the process working
    /// directory when `None`.
    pub base_dir: Option<PathBuf>,
}

impl RunContext {
    pub fn new(config: AgentConfig, uploader: Arc<dyn Uploader>) -> Self {
        let pid = config.pid;
        let netstat_dwell = Duration::from_secs(config.netstat_dwell_secs);
        Self {
            config,
            uploader,
            pid,
            app_follower: Arc::new(Mutex::new(LogFollower::new("applog"))),
            access_follower: Arc::new(Mutex::new(LogFollower::new("accessLog"))),
            netstat_dwell,
            base_dir: None,
        }
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub dir: PathBuf,
    pub outcomes: Vec<(String, CaptureResult)>,
}

impl RunReport {
    /// Whether any artifact at all was captured and transmitted.
    pub fn any_ok(&self) -> bool {
        self.outcomes.iter().any(|(_, result)| result.ok)
    }
}

/// Restores the original working directory when the run ends, on every
/// exit path.
struct CwdGuard {
    original: PathBuf,
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.original) {
            warn!(dir = %self.original.display(), error = %e, "cannot restore working directory");
        }
    }
}

#[derive(Serialize)]
struct RunMeta<'a> {
    run_id: &'a str,
    started_at: String,
    hostname: String,
    pid: Option<u32>,
    kind: &'a str,
    artifacts: Vec<MetaArtifact<'a>>,
}

#[derive(Serialize)]
struct MetaArtifact<'a> {
    kind: &'a str,
    ok: bool,
    response: &'a str,
}

/// Execute one capture run.
///
/// Setup failures (no working directory, run directory not creatable)
/// abort before any task starts. After that point every failure is
/// artifact-local: the run always joins every spawned task and reports
/// every outcome.
pub fn execute_run(ctx: &RunContext, kind: RunKind) -> Result<RunReport> {
    let _run_guard = capture::lock_run();

    let original_cwd = std::env::current_dir()
        .map_err(|e| Error::Setup(format!("cannot determine working directory: {e}")))?;
    let base_dir = ctx.base_dir.clone().unwrap_or_else(|| original_cwd.clone());
    let run_id = format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    );
    let run_dir = base_dir.join(format!("jsnap-{run_id}"));
    std::fs::create_dir_all(&run_dir)
        .map_err(|e| Error::Setup(format!("cannot create {}: {e}", run_dir.display())))?;
    std::env::set_current_dir(&run_dir)
        .map_err(|e| Error::Setup(format!("cannot enter {}: {e}", run_dir.display())))?;
    let _cwd_guard = CwdGuard {
        original: original_cwd,
    };

    info!(run_id, dir = %run_dir.display(), ?kind, "capture run started");

    let gate = Arc::new(Gate::new());
    let (tasks, gate_armed) = build_tasks(ctx, kind, &gate);

    let endpoint = &ctx.config.server;
    let spawned: Vec<(String, Receiver<CaptureResult>)> = tasks
        .into_iter()
        .map(|task| {
            let task_kind = task.kind().to_string();
            (task_kind, capture::spawn_capture(endpoint, task))
        })
        .collect();

    // Let connection states drift before the second netstat snapshot.
    // Without a netstat task nothing waits on the gate, so the dwell
    // would only stall the run while every result sits in its channel.
    if gate_armed {
        std::thread::sleep(ctx.netstat_dwell);
        gate.open();
    }

    let mut outcomes: Vec<(String, CaptureResult)> = Vec::with_capacity(spawned.len());
    for (task_kind, rx) in spawned {
        let result = rx.recv().unwrap_or_else(|_| {
            CaptureResult::failure("task thread terminated without a result")
        });
        // One line per artifact kind, success or not, so operators can
        // always account for every artifact.
        info!(
            "DATA: {} / transmitted? {} / response: {}",
            task_kind, result.ok, result.message
        );
        outcomes.push((task_kind, result));
    }

    let meta_outcome = write_and_upload_meta(ctx, &run_id, kind, &outcomes);
    info!(
        "DATA: {} / transmitted? {} / response: {}",
        DataTag::Meta,
        meta_outcome.ok,
        meta_outcome.message
    );
    outcomes.push((DataTag::Meta.as_str().to_string(), meta_outcome));

    info!(run_id, "capture run finished");
    Ok(RunReport {
        run_id,
        dir: run_dir,
        outcomes,
    })
}

/// Build the task set for a run. The second value reports whether a
/// gate consumer was scheduled, so the driver knows to perform the
/// dwell-then-open sequence.
fn build_tasks(
    ctx: &RunContext,
    kind: RunKind,
    gate: &Arc<Gate>,
) -> (Vec<Box<dyn Task>>, bool) {
    let uploader = &ctx.uploader;
    let mut gate_armed = false;
    let mut tasks: Vec<Box<dyn Task>> = vec![
        system::top(Arc::clone(uploader)),
        system::vmstat(Arc::clone(uploader)),
        system::ps(Arc::clone(uploader)),
        logs::LogCaptureTask::app_logs(
            Arc::clone(uploader),
            ctx.config.app_logs.clone(),
            Arc::clone(&ctx.app_follower),
        ),
        logs::LogCaptureTask::access_logs(
            Arc::clone(uploader),
            ctx.config.access_logs.clone(),
            Arc::clone(&ctx.access_follower),
        ),
    ];

    if let Some(pid) = ctx.pid {
        let tool = &ctx.config.attach_tool;
        tasks.push(jvm::ThreadDumpTask::new(Arc::clone(uploader), pid, tool));
        tasks.push(jvm::GcLogTask::new(
            Arc::clone(uploader),
            pid,
            tool,
            ctx.config.gc_log.as_ref().map(PathBuf::from),
        ));
        if kind == RunKind::Full {
            tasks.push(jvm::HeapDumpTask::new(Arc::clone(uploader), pid, tool));
        }
    } else {
        warn!("no target pid; JVM-level captures skipped");
    }

    if kind == RunKind::Full {
        tasks.push(system::NetStatTask::new(Arc::clone(uploader), Arc::clone(gate)));
        gate_armed = true;
        tasks.push(system::PingTask::new(Arc::clone(uploader)));
        tasks.push(system::kernel_params(Arc::clone(uploader)));
        tasks.push(system::disk_usage(Arc::clone(uploader)));
        tasks.push(system::dmesg(Arc::clone(uploader)));
        if let Some(script) = &ctx.config.custom_script {
            tasks.push(script::CustomScriptTask::new(Arc::clone(uploader), script));
        }
        if let Some(script) = &ctx.config.extended_script {
            tasks.push(script::ExtendedDataTask::new(
                Arc::clone(uploader),
                script,
                Duration::from_secs(ctx.config.extended_timeout_secs),
            ));
        }
    }

    (tasks, gate_armed)
}

/// Write the run metadata artifact and upload it.
fn write_and_upload_meta(
    ctx: &RunContext,
    run_id: &str,
    kind: RunKind,
    outcomes: &[(String, CaptureResult)],
) -> CaptureResult {
    let meta = RunMeta {
        run_id,
        started_at: chrono::Utc::now().to_rfc3339(),
        hostname: hostname(),
        pid: ctx.pid,
        kind: match kind {
            RunKind::Full => "full",
            RunKind::Monitor => "monitor",
        },
        artifacts: outcomes
            .iter()
            .map(|(task_kind, result)| MetaArtifact {
                kind: task_kind,
                ok: result.ok,
                response: &result.message,
            })
            .collect(),
    };

    let meta_path = Path::new("run-meta.json");
    let serialized = match serde_json::to_vec_pretty(&meta) {
        Ok(bytes) => bytes,
        Err(e) => return CaptureResult::failure(format!("cannot serialize run metadata: {e}")),
    };
    if let Err(e) = std::fs::write(meta_path, serialized) {
        return CaptureResult::failure(format!("cannot write run metadata: {e}"));
    }

    let (message, ok) = ctx.uploader.post(
        &ctx.config.server,
        DataTag::Meta.as_str(),
        meta_path,
        upload::whole_file,
    );
    CaptureResult { message, ok }
}

fn hostname() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::MemoryUploader;

    fn test_config(dir: &Path) -> AgentConfig {
        let yaml = format!(
            "server: http://analysis.test\napi_key: k\napp_logs:\n  - {}/*.log\n",
            dir.display()
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn monitor_run_reports_every_artifact_kind() {
        let work_dir = tempfile::tempdir().unwrap();
        let logs_dir = tempfile::tempdir().unwrap();
        std::fs::write(logs_dir.path().join("app.log"), b"hello\n").unwrap();

        let uploader: Arc<dyn Uploader> = Arc::new(MemoryUploader::new());
        let mut ctx = RunContext::new(test_config(logs_dir.path()), uploader);
        ctx.pid = None;
        ctx.netstat_dwell = Duration::from_millis(10);
        // Run out of a scratch directory so run dirs do not pollute the
        // repository.
        ctx.base_dir = Some(work_dir.path().to_path_buf());

        let report = execute_run(&ctx, RunKind::Monitor).unwrap();

        let kinds: Vec<&str> = report.outcomes.iter().map(|(k, _)| k.as_str()).collect();
        for expected in ["top", "vmstat", "ps", "applog", "accessLog", "meta"] {
            assert!(kinds.contains(&expected), "missing {expected} in {kinds:?}");
        }
        // Monitor runs never heap dump.
        assert!(!kinds.contains(&"hd"));
        assert!(report.dir.is_dir());
        assert!(report.dir.join("run-meta.json").is_file());
    }

    #[test]
    fn monitor_run_skips_the_netstat_dwell() {
        let work_dir = tempfile::tempdir().unwrap();
        let logs_dir = tempfile::tempdir().unwrap();

        let uploader: Arc<dyn Uploader> = Arc::new(MemoryUploader::new());
        let mut ctx = RunContext::new(test_config(logs_dir.path()), uploader);
        ctx.pid = None;
        // Deliberately long: a monitor run schedules no netstat task, so
        // it must finish without waiting this out.
        ctx.netstat_dwell = Duration::from_secs(30);
        ctx.base_dir = Some(work_dir.path().to_path_buf());

        let started = std::time::Instant::now();
        let report = execute_run(&ctx, RunKind::Monitor).unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(15),
            "monitor run stalled for the netstat dwell"
        );
        assert!(report.outcomes.iter().all(|(k, _)| k != "ns"));
    }

    #[test]
    fn access_log_failure_does_not_block_other_outcomes() {
        let work_dir = tempfile::tempdir().unwrap();
        let logs_dir = tempfile::tempdir().unwrap();

        let uploader: Arc<dyn Uploader> = Arc::new(MemoryUploader::new());
        let mut config = test_config(logs_dir.path());
        config.access_logs = vec!["/nonexistent/dir/*.log".to_string()];
        let mut ctx = RunContext::new(config, uploader);
        ctx.pid = None;
        ctx.netstat_dwell = Duration::from_millis(10);
        ctx.base_dir = Some(work_dir.path().to_path_buf());

        let report = execute_run(&ctx, RunKind::Monitor).unwrap();

        let access = report
            .outcomes
            .iter()
            .find(|(k, _)| k == "accessLog")
            .unwrap();
        assert!(!access.1.ok);
        // The meta artifact is still produced and recorded.
        assert!(report.outcomes.iter().any(|(k, _)| k == "meta"));
    }
}
