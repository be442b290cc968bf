//! Upload boundary.
//!
//! Captures are never gated on network reachability: a task that
//! produced its artifact but cannot upload reports `ok=false` with a
//! descriptive message and nothing else is affected. The positioning
//! function is applied to the file immediately before the body is read
//! so exactly the selected byte range is transmitted.

use crate::capture::tail;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// File-cursor positioning applied just before streaming.
///
/// Either a tail positioner bounding the transmitted suffix, or
/// [`tail::position_start`] for whole-file transfer.
pub type Positioner = fn(&mut File) -> std::io::Result<()>;

/// Upload transport contract.
///
/// Returns `(message, ok)` rather than an error: an upload failure is
/// an artifact-level outcome, not an exception.
pub trait Uploader: Send + Sync {
    fn post(&self, endpoint: &str, dtag: &str, path: &Path, positioner: Positioner)
        -> (String, bool);
}

/// HTTP implementation of the upload contract.
pub struct HttpUploader {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl HttpUploader {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

/// Read the selected byte range of an artifact.
///
/// Returns `None` for an empty file, which is skipped with an
/// informational message rather than uploaded.
fn read_positioned(path: &Path, positioner: Positioner) -> std::io::Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    positioner(&mut file)?;
    let mut body = Vec::new();
    file.read_to_end(&mut body)?;
    Ok(Some(body))
}

impl Uploader for HttpUploader {
    fn post(
        &self,
        endpoint: &str,
        dtag: &str,
        path: &Path,
        positioner: Positioner,
    ) -> (String, bool) {
        let body = match read_positioned(path, positioner) {
            Ok(Some(body)) => body,
            Ok(None) => {
                info!(dtag, path = %path.display(), "artifact is empty, skipping upload");
                return (format!("{} is empty, skipped", path.display()), true);
            }
            Err(e) => {
                return (format!("cannot read {}: {e}", path.display()), false);
            }
        };

        let url = format!("{endpoint}?dt={dtag}");
        debug!(url, bytes = body.len(), "uploading artifact");
        match self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
        {
            Ok(response) => {
                let ok = response.status().is_success();
                let status = response.status();
                let text = response.text().unwrap_or_default();
                if !ok {
                    warn!(dtag, %status, "upload rejected");
                }
                (format!("{status}: {}", text.trim()), ok)
            }
            Err(e) => {
                warn!(dtag, error = %e, "upload failed");
                (format!("upload of {dtag} failed: {e}"), false)
            }
        }
    }
}

/// In-memory uploader for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    posts: std::sync::Mutex<Vec<RecordedPost>>,
}

/// One recorded post.
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub endpoint: String,
    pub dtag: String,
    pub file_name: String,
    pub body: Vec<u8>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Uploader for MemoryUploader {
    fn post(
        &self,
        endpoint: &str,
        dtag: &str,
        path: &Path,
        positioner: Positioner,
    ) -> (String, bool) {
        let body = match read_positioned(path, positioner) {
            Ok(Some(body)) => body,
            Ok(None) => return (format!("{} is empty, skipped", path.display()), true),
            Err(e) => return (format!("cannot read {}: {e}", path.display()), false),
        };
        let bytes = body.len();
        self.posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedPost {
                endpoint: endpoint.to_string(),
                dtag: dtag.to_string(),
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                body,
            });
        (format!("recorded {bytes} bytes"), true)
    }
}

/// Whole-file positioner.
pub fn whole_file(file: &mut File) -> std::io::Result<()> {
    tail::position_start(file)
}

/// Standard bounded-suffix positioner for large text artifacts.
pub fn last_5000_lines(file: &mut File) -> std::io::Result<()> {
    tail::position_last_5000(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_artifact_is_skipped_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.out");
        File::create(&path).unwrap();

        let uploader = MemoryUploader::new();
        let (message, ok) = uploader.post("http://server", "top", &path, whole_file);
        assert!(ok);
        assert!(message.contains("empty"));
        assert!(uploader.recorded().is_empty());
    }

    #[test]
    fn positioner_bounds_the_transmitted_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        let mut file = File::create(&path).unwrap();
        for i in 0..10 {
            writeln!(file, "line{i}").unwrap();
        }
        drop(file);

        fn last_two(file: &mut File) -> std::io::Result<()> {
            tail::position_last_lines(file, 2)
        }

        let uploader = MemoryUploader::new();
        let (_, ok) = uploader.post("http://server", "applog", &path, last_two);
        assert!(ok);
        let posts = uploader.recorded();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].body, b"line8\nline9\n");
        assert_eq!(posts[0].dtag, "applog");
    }

    #[test]
    fn missing_file_reports_failure() {
        let uploader = MemoryUploader::new();
        let (message, ok) = uploader.post(
            "http://server",
            "gc",
            Path::new("/nonexistent/gc.log"),
            whole_file,
        );
        assert!(!ok);
        assert!(message.contains("cannot read"));
    }
}
