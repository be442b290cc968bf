//! Data-type tag vocabulary and artifact naming convention.
//!
//! Tags are fixed strings sent with every upload so the analysis backend
//! can route each artifact to the right parser. The artifact file-naming
//! rule (`"<n>.<category>.<baseName>"`) is relied on by downstream
//! tooling and must not change.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Data-type tags understood by the analysis endpoint.
///
/// The wire strings are fixed. The set is non-exhaustive on the server
/// side; adding a variant here is safe, renaming one is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataTag {
    Top,
    VmStat,
    Ps,
    NetStat,
    GcLog,
    ThreadDump,
    HeapDump,
    HeapDumpSub,
    AppLog,
    AccessLog,
    Ping,
    Kernel,
    Disk,
    Meta,
    Dmesg,
    Custom,
}

impl DataTag {
    /// The exact string sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataTag::Top => "top",
            DataTag::VmStat => "vmstat",
            DataTag::Ps => "ps",
            DataTag::NetStat => "ns",
            DataTag::GcLog => "gc",
            DataTag::ThreadDump => "td",
            DataTag::HeapDump => "hd",
            DataTag::HeapDumpSub => "hdsub",
            DataTag::AppLog => "applog",
            DataTag::AccessLog => "accessLog",
            DataTag::Ping => "ping",
            DataTag::Kernel => "kernel",
            DataTag::Disk => "df",
            DataTag::Meta => "meta",
            DataTag::Dmesg => "dmesg",
            DataTag::Custom => "custom",
        }
    }
}

impl std::fmt::Display for DataTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick an unused artifact name in `dir` following the fixed convention
/// `"<n>.<category>.<baseName>"`.
///
/// `n` starts at 1 and increments until a name not already present in
/// `dir` is found, so repeated captures of the same source file never
/// clobber earlier artifacts within one run directory.
pub fn unique_artifact_name(dir: &Path, category: &str, base_name: &str) -> PathBuf {
    let mut n: u64 = 1;
    loop {
        let candidate = dir.join(format!("{n}.{category}.{base_name}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
