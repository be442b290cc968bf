//! Typed structure of `jsnap.yaml`.

use serde::{Deserialize, Serialize};

/// Agent configuration.
///
/// Every field except `server` and `api_key` has a usable default so a
/// two-line config file is enough to run the agent against a JVM found
/// by pid at invocation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Analysis endpoint base URL (http or https).
    pub server: String,

    /// API key sent with every upload.
    pub api_key: String,

    /// Target JVM pid. May also be supplied on the command line, which
    /// takes precedence.
    #[serde(default)]
    pub pid: Option<u32>,

    /// Application log paths or glob patterns (`*`/`?` in the final
    /// path component).
    #[serde(default)]
    pub app_logs: Vec<String>,

    /// Access log paths or glob patterns.
    #[serde(default)]
    pub access_logs: Vec<String>,

    /// GC log path override. When set, command-line discovery is skipped.
    #[serde(default)]
    pub gc_log: Option<String>,

    /// Optional custom capture script, run once per snapshot.
    #[serde(default)]
    pub custom_script: Option<String>,

    /// Optional extended-data script, run with a hard wall-clock timeout.
    #[serde(default)]
    pub extended_script: Option<String>,

    /// Wall-clock timeout for the extended-data script.
    #[serde(default = "default_extended_timeout_secs")]
    pub extended_timeout_secs: u64,

    /// Interval between M3 (continuous monitoring) capture ticks.
    #[serde(default = "default_m3_interval_secs")]
    pub m3_interval_secs: u64,

    /// Seconds between the two netstat snapshots of a full run.
    #[serde(default = "default_netstat_dwell_secs")]
    pub netstat_dwell_secs: u64,

    /// JDK diagnostic tool used by the privileged capture chain
    /// (defaults to `jcmd` on PATH).
    #[serde(default = "default_attach_tool")]
    pub attach_tool: String,

    /// Logging settings.
    #[serde(default)]
    pub log: LogSettings,
}

fn default_extended_timeout_secs() -> u64 {
    300
}

fn default_m3_interval_secs() -> u64 {
    180
}

fn default_netstat_dwell_secs() -> u64 {
    60
}

fn default_attach_tool() -> String {
    "jcmd".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit machine-parseable JSON lines instead of human format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
