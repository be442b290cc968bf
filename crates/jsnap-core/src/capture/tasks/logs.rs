//! Application and access log capture.
//!
//! Both kinds share one implementation: expand the configured patterns,
//! poll each matched file through the incremental reader, and upload
//! every produced artifact. The follower is shared with the owning
//! driver so read positions survive across M3 ticks.

use crate::capture::follow::LogFollower;
use crate::capture::{CaptureResult, Task, TaskBase};
use crate::fsglob;
use crate::upload::{self, Uploader};
use jsnap_common::DataTag;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct LogCaptureTask {
    base: TaskBase,
    uploader: Arc<dyn Uploader>,
    tag: DataTag,
    patterns: Vec<String>,
    follower: Arc<Mutex<LogFollower>>,
}

impl LogCaptureTask {
    pub fn app_logs(
        uploader: Arc<dyn Uploader>,
        patterns: Vec<String>,
        follower: Arc<Mutex<LogFollower>>,
    ) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            tag: DataTag::AppLog,
            patterns,
            follower,
        })
    }

    pub fn access_logs(
        uploader: Arc<dyn Uploader>,
        patterns: Vec<String>,
        follower: Arc<Mutex<LogFollower>>,
    ) -> Box<Self> {
        Box::new(Self {
            base: TaskBase::new(),
            uploader,
            tag: DataTag::AccessLog,
            patterns,
            follower,
        })
    }
}

impl Task for LogCaptureTask {
    fn kind(&self) -> &'static str {
        self.tag.as_str()
    }

    fn set_endpoint(&mut self, url: &str) {
        self.base.set_endpoint(url);
    }

    fn run(&mut self) -> jsnap_common::Result<CaptureResult> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for pattern in &self.patterns {
            paths.extend(fsglob::glob(pattern));
        }
        if paths.is_empty() {
            return Ok(CaptureResult::failure(format!(
                "no files matched {:?}",
                self.patterns
            )));
        }

        let (captured, artifacts) = self
            .follower
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .poll_batch(&paths, Path::new("."));

        // Captured-but-not-uploaded still marks the artifact failed.
        let mut ok = captured.ok;
        let mut message = captured.message;
        for artifact in &artifacts {
            let (upload_message, upload_ok) = self.uploader.post(
                self.base.endpoint(),
                self.tag.as_str(),
                artifact,
                upload::whole_file,
            );
            message.push_str(&format!("; upload {}: {upload_message}", artifact.display()));
            ok = ok && upload_ok;
        }

        Ok(CaptureResult { message, ok })
    }
}
