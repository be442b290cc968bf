//! OS-level capture tasks.

use super::CommandTask;
use crate::capture::{CaptureResult, Gate, Task, TaskBase};
use crate::runner::CommandRunner;
use crate::upload::{self, Uploader};
use jsnap_common::{DataTag, Error};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Ceiling on how long the netstat task waits for the driver to open
/// the gate before taking its second snapshot anyway.
const NETSTAT_GATE_CEILING: Duration = Duration::from_secs(300);

#[cfg(target_os = "linux")]
const TOP_ARGS: &[&str] = &["-b", "-n", "1"];
#[cfg(not(target_os = "linux"))]
const TOP_ARGS: &[&str] = &["-l", "1"];

pub fn top(uploader: Arc<dyn Uploader>) -> Box<dyn Task> {
    CommandTask::new(
        uploader,
        DataTag::Top,
        "top",
        TOP_ARGS,
        "top.out",
        upload::last_5000_lines,
    )
}

pub fn vmstat(uploader: Arc<dyn Uploader>) -> Box<dyn Task> {
    CommandTask::new(
        uploader,
        DataTag::VmStat,
        "vmstat",
        &["1", "5"],
        "vmstat.out",
        upload::whole_file,
    )
}

pub fn ps(uploader: Arc<dyn Uploader>) -> Box<dyn Task> {
    CommandTask::new(
        uploader,
        DataTag::Ps,
        "ps",
        &["-ef"],
        "ps.out",
        upload::whole_file,
    )
}

pub fn kernel_params(uploader: Arc<dyn Uploader>) -> Box<dyn Task> {
    CommandTask::new(
        uploader,
        DataTag::Kernel,
        "sysctl",
        &["-a"],
        "kernel.out",
        upload::whole_file,
    )
}

pub fn disk_usage(uploader: Arc<dyn Uploader>) -> Box<dyn Task> {
    CommandTask::new(
        uploader,
        DataTag::Disk,
        "df",
        &["-h"],
        "df.out",
        upload::whole_file,
    )
}

pub fn dmesg(uploader: Arc<dyn Uploader>) -> Box<dyn Task> {
    CommandTask::new(
        uploader,
        DataTag::Dmesg,
        "dmesg",
        &[],
        "dmesg.out",
        upload::last_5000_lines,
    )
}

/// Two-phase network snapshot.
///
/// Takes one `netstat` snapshot immediately, waits on the gate the run
/// driver opens after the dwell period, then takes a second snapshot so
/// the backend can diff connection states across the run.
pub struct NetStatTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
    gate: Arc<Gate>,
}

impl NetStatTask {
    pub fn new(uploader: Arc<dyn Uploader>, gate: Arc<Gate>) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            runner: CommandRunner::default(),
            gate,
        })
    }

    fn snapshot(&self, out: &mut File, index: u32) -> jsnap_common::Result<()> {
        writeln!(out, "===== netstat snapshot {index}: {} =====", chrono::Utc::now())?;
        let bytes = self
            .runner
            .run_combined_output("netstat", &["-an"], Some(self.base.handle()))
            .map_err(|e| Error::Command(e.to_string()))?;
        out.write_all(&bytes)?;
        Ok(())
    }
}

impl Task for NetStatTask {
    fn kind(&self) -> &'static str {
        DataTag::NetStat.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let dest = Path::new("netstat.out");
        let mut out = File::create(dest)?;

        self.snapshot(&mut out, 1)?;
        let opened = self.gate.wait(NETSTAT_GATE_CEILING);
        if !opened {
            writeln!(out, "===== gate never opened, second snapshot taken anyway =====")?;
        }
        self.snapshot(&mut out, 2)?;
        drop(out);

        let (message, ok) = self.uploader.post(
            self.base.endpoint(),
            DataTag::NetStat.as_str(),
            dest,
            upload::whole_file,
        );
        Ok(CaptureResult { message, ok })
    }

    fn kill(&self) {
        self.base.kill();
    }

    fn interrupt(&self) {
        self.base.interrupt();
    }
}

/// Endpoint reachability probe.
///
/// Unlike the other command tasks the ping target is not known until
/// `set_endpoint`, so the argument list is built at run time.
pub struct PingTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
}

impl PingTask {
    pub fn new(uploader: Arc<dyn Uploader>) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            runner: CommandRunner::new(Duration::from_secs(30)),
        })
    }
}

/// Extract the host from an http(s) endpoint URL.
fn endpoint_host(endpoint: &str) -> Option<&str> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))?;
    let host_port = rest.split('/').next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

impl Task for PingTask {
    fn kind(&self) -> &'static str {
        DataTag::Ping.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let Some(host) = endpoint_host(self.base.endpoint()) else {
            return Ok(CaptureResult::failure(format!(
                "cannot extract host from endpoint {:?}",
                self.base.endpoint()
            )));
        };
        let host = host.to_string();

        let dest = Path::new("ping.out");
        self.runner
            .run_to_file("ping", &["-c", "3", &host], dest, Some(self.base.handle()))
            .map_err(|e| Error::Command(e.to_string()))?;

        let (message, ok) = self.uploader.post(
            self.base.endpoint(),
            DataTag::Ping.as_str(),
            dest,
            upload::whole_file,
        );
        Ok(CaptureResult { message, ok })
    }

    fn kill(&self) {
        self.base.kill();
    }

    fn interrupt(&self) {
        self.base.interrupt();
    }
}
