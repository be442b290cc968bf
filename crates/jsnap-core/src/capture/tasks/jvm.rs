//! JVM-level capture tasks: thread dumps, heap dumps, GC logs.

use crate::capture::attach::{AttachChain, AttachOp};
use crate::capture::{aggregate, gclog, CaptureResult, Task, TaskBase};
use crate::runner::CommandRunner;
use crate::upload::{self, Uploader};
use jsnap_common::{DataTag, Error};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Number of thread-dump samples per capture.
const THREAD_DUMP_SAMPLES: u32 = 3;

/// Pause between consecutive thread-dump samples.
const THREAD_DUMP_PAUSE: Duration = Duration::from_secs(2);

/// Three-sample thread dump through the privileged capture chain.
pub struct ThreadDumpTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
    pid: u32,
    tool: String,
}

impl ThreadDumpTask {
    pub fn new(uploader: Arc<dyn Uploader>, pid: u32, tool: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            runner: CommandRunner::default(),
            pid,
            tool: tool.into(),
        })
    }
}

impl Task for ThreadDumpTask {
    fn kind(&self) -> &'static str {
        DataTag::ThreadDump.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let chain = AttachChain::new(&self.runner, self.pid, &self.tool);
        let combined_path = Path::new("threaddump.out");
        let mut combined = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(combined_path)?;

        let mut outcomes = Vec::new();
        for sample in 1..=THREAD_DUMP_SAMPLES {
            let sample_path = PathBuf::from(format!("threaddump.{sample}.tmp"));
            match chain.capture(AttachOp::ThreadDump, &sample_path) {
                Ok(actual) => {
                    writeln!(
                        combined,
                        "===== thread dump sample {sample}: {} =====",
                        chrono::Utc::now()
                    )?;
                    let bytes = std::fs::read(&actual)?;
                    combined.write_all(&bytes)?;
                    let _ = std::fs::remove_file(&sample_path);
                    outcomes.push((
                        CaptureResult::success(format!("sample {sample}: {} bytes", bytes.len())),
                        None,
                    ));
                }
                Err(e) => {
                    outcomes.push((
                        CaptureResult::failure(format!("sample {sample} failed")),
                        Some(e),
                    ));
                }
            }
            if sample < THREAD_DUMP_SAMPLES {
                std::thread::sleep(THREAD_DUMP_PAUSE);
            }
        }
        drop(combined);

        let (captured, last_error) = aggregate::summarize(outcomes);
        if !captured.ok {
            return Err(last_error
                .unwrap_or_else(|| Error::Capture("all thread dump samples failed".into())));
        }

        let (message, ok) = self.uploader.post(
            self.base.endpoint(),
            DataTag::ThreadDump.as_str(),
            combined_path,
            upload::whole_file,
        );
        Ok(CaptureResult {
            message: format!("{}; upload: {message}", captured.message),
            ok,
        })
    }

    fn kill(&self) {
        self.base.kill();
    }

    fn interrupt(&self) {
        self.base.interrupt();
    }
}

/// Heap dump through the privileged capture chain, with a class
/// histogram as substitute artifact when the dump itself is impossible.
pub struct HeapDumpTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
    pid: u32,
    tool: String,
}

impl HeapDumpTask {
    pub fn new(uploader: Arc<dyn Uploader>, pid: u32, tool: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            // Heap dumps of large JVMs are slow.
            runner: CommandRunner::new(Duration::from_secs(600)),
            pid,
            tool: tool.into(),
        })
    }
}

impl Task for HeapDumpTask {
    fn kind(&self) -> &'static str {
        DataTag::HeapDump.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let chain = AttachChain::new(&self.runner, self.pid, &self.tool);
        let requested = std::env::current_dir()?.join("heapdump.hprof");

        match chain.capture(AttachOp::HeapDump, &requested) {
            Ok(actual) => {
                // A tool-substituted path supersedes the requested one,
                // including for compression.
                let upload_path = match zip_dump(&actual, Path::new("heapdump.zip")) {
                    Ok(()) => PathBuf::from("heapdump.zip"),
                    Err(e) => {
                        warn!(error = %e, "cannot compress heap dump, uploading raw");
                        actual
                    }
                };
                let (message, ok) = self.uploader.post(
                    self.base.endpoint(),
                    DataTag::HeapDump.as_str(),
                    &upload_path,
                    upload::whole_file,
                );
                Ok(CaptureResult { message, ok })
            }
            Err(dump_error) => {
                info!(pid = self.pid, error = %dump_error, "heap dump impossible, capturing histogram substitute");
                let histogram_path = Path::new("histogram.out");
                chain.capture(AttachOp::Histogram, histogram_path)?;
                let (message, ok) = self.uploader.post(
                    self.base.endpoint(),
                    DataTag::HeapDumpSub.as_str(),
                    histogram_path,
                    upload::whole_file,
                );
                Ok(CaptureResult {
                    message: format!("heap dump failed ({dump_error}); histogram substitute: {message}"),
                    ok,
                })
            }
        }
    }

    fn kill(&self) {
        self.base.kill();
    }

    fn interrupt(&self) {
        self.base.interrupt();
    }
}

/// Compress a heap dump into a single-entry deflate archive.
///
/// Dumps compress well (often below a third of the raw size) and
/// uploading the raw file routinely hits endpoint body limits.
fn zip_dump(source: &Path, dest: &Path) -> jsnap_common::Result<()> {
    let entry_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("heapdump.hprof");
    let mut writer = ZipWriter::new(File::create(dest)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    writer
        .start_file(entry_name, options)
        .map_err(|e| Error::Capture(format!("cannot start archive entry: {e}")))?;
    let mut dump = File::open(source)?;
    std::io::copy(&mut dump, &mut writer)?;
    writer
        .finish()
        .map_err(|e| Error::Capture(format!("cannot finish archive: {e}")))?;
    Ok(())
}

/// GC-log capture.
///
/// Resolution is recomputed on every run because rotation changes which
/// concrete file is current. Without a declared GC log the task falls
/// back to perf-counter sampling through the capture chain so the
/// backend still receives GC data.
pub struct GcLogTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
    pid: u32,
    tool: String,
    /// Configured override; skips command-line discovery when set.
    declared_override: Option<PathBuf>,
}

impl GcLogTask {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        pid: u32,
        tool: impl Into<String>,
        declared_override: Option<PathBuf>,
    ) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            runner: CommandRunner::default(),
            pid,
            tool: tool.into(),
            declared_override,
        })
    }
}

impl Task for GcLogTask {
    fn kind(&self) -> &'static str {
        DataTag::GcLog.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let declared = self
            .declared_override
            .clone()
            .or_else(|| gclog::discover_for_pid(self.pid));

        if let Some(declared) = declared {
            let current = gclog::resolve_current(&declared, Some(self.pid));
            if current.exists() {
                let (message, ok) = self.uploader.post(
                    self.base.endpoint(),
                    DataTag::GcLog.as_str(),
                    &current,
                    upload::last_5000_lines,
                );
                return Ok(CaptureResult { message, ok });
            }
            info!(
                pid = self.pid,
                declared = %declared.display(),
                "declared GC log does not exist, sampling perf counters instead"
            );
        }

        let chain = AttachChain::new(&self.runner, self.pid, &self.tool);
        let sample_path = Path::new("gcstat.out");
        chain.capture(AttachOp::Jstat, sample_path)?;
        let (message, ok) = self.uploader.post(
            self.base.endpoint(),
            DataTag::GcLog.as_str(),
            sample_path,
            upload::whole_file,
        );
        Ok(CaptureResult {
            message: format!("no GC log file; perf-counter sample: {message}"),
            ok,
        })
    }

    fn kill(&self) {
        self.base.kill();
    }

    fn interrupt(&self) {
        self.base.interrupt();
    }
}
