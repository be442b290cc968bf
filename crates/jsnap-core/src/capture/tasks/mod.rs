//! Concrete capture tasks, one per artifact kind.
//!
//! Every task owns its output file(s) for the duration of `run()`;
//! ownership ends when the file is closed after upload. Paths are
//! relative to the per-run directory, which is the process working
//! directory while a run executes.

pub mod jvm;
pub mod logs;
pub mod script;
pub mod system;

use super::{CaptureResult, Task, TaskBase};
use crate::runner::CommandRunner;
use crate::upload::{Positioner, Uploader};
use jsnap_common::DataTag;
use std::path::Path;
use std::sync::Arc;

/// A task that runs one OS command into a file and uploads it.
///
/// Covers top, vmstat, ps, kernel params, disk usage, and dmesg — the
/// artifact kinds with no JVM awareness and no cross-task coupling.
pub struct CommandTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
    tag: DataTag,
    command: &'static str,
    args: &'static [&'static str],
    output_name: &'static str,
    positioner: Positioner,
}

impl CommandTask {
    fn new(
        uploader: Arc<dyn Uploader>,
        tag: DataTag,
        command: &'static str,
        args: &'static [&'static str],
        output_name: &'static str,
        positioner: Positioner,
    ) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            runner: CommandRunner::default(),
            tag,
            command,
            args,
            output_name,
            positioner,
        })
    }
}

impl Task for CommandTask {
    fn kind(&self) -> &'static str {
        self.tag.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let dest = Path::new(self.output_name);
        self.runner
            .run_to_file(self.command, self.args, dest, Some(self.base.handle()))
            .map_err(|e| jsnap_common::Error::Command(e.to_string()))?;

        let (message, ok) =
            self.uploader
                .post(self.base.endpoint(), self.tag.as_str(), dest, self.positioner);
        Ok(CaptureResult { message, ok })
    }

    fn kill(&self) {
        self.base.kill();
    }

    fn interrupt(&self) {
        self.base.interrupt();
    }
}
