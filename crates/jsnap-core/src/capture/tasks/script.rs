//! Operator-supplied capture scripts.

use crate::capture::{CaptureResult, Task, TaskBase};
use crate::runner::{CommandRunner, RunnerError};
use crate::upload::{self, Uploader};
use jsnap_common::{DataTag, Error};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Custom capture script, run once per snapshot with the default
/// command timeout.
pub struct CustomScriptTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
    script: String,
}

impl CustomScriptTask {
    pub fn new(uploader: Arc<dyn Uploader>, script: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            runner: CommandRunner::default(),
            script: script.into(),
        })
    }
}

impl Task for CustomScriptTask {
    fn kind(&self) -> &'static str {
        DataTag::Custom.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let dest = Path::new("custom.out");
        self.runner
            .run_to_file(&self.script, &[], dest, Some(self.base.handle()))
            .map_err(|e| Error::Command(e.to_string()))?;

        let (message, ok) = self.uploader.post(
            self.base.endpoint(),
            DataTag::Custom.as_str(),
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

/// Extended-data script with a hard wall-clock deadline.
///
/// The only capture with true cancellation-by-deadline semantics: the
/// runner forcibly terminates the script at the deadline and the task
/// surfaces a timeout error instead of waiting indefinitely.
pub struct ExtendedDataTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    runner: CommandRunner,
    script: String,
    timeout: Duration,
}

impl ExtendedDataTask {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        script: impl Into<String>,
        timeout: Duration,
    ) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            runner: CommandRunner::new(timeout),
            script: script.into(),
            timeout,
        })
    }
}

impl Task for ExtendedDataTask {
    fn kind(&self) -> &'static str {
        "extended"
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let dest = Path::new("extended.out");
        match self
            .runner
            .run_to_file(&self.script, &[], dest, Some(self.base.handle()))
        {
            Ok(()) => {}
            Err(RunnerError::Timeout { .. }) => {
                return Err(Error::CommandTimeout {
                    seconds: self.timeout.as_secs(),
                });
            }
            Err(e) => return Err(Error::Command(e.to_string())),
        }

        let (message, ok) = self.uploader.post(
            self.base.endpoint(),
            DataTag::Meta.as_str(),
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
