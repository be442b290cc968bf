//! GC-log path discovery and concrete-file resolution.
//!
//! Discovery parses the target JVM's command line for a declared GC-log
//! path across three flag dialects, strictly in priority order:
//!
//! 1. `-Xloggc:<path>` (legacy, JDK 8 and earlier)
//! 2. `-Xlog:...:file=<path>...` / `-Xlog:gc:<path>` (unified logging,
//!    JEP 158 grammar)
//! 3. `-Xverbosegclog:<path>[,rotationCount,rotationSize]` (OpenJ9)
//!
//! Resolution turns the discovered (possibly templated) path into the
//! concrete file to read *at capture time*; it is recomputed on every
//! attempt because rotation changes which file is current.

use crate::{fsglob, proc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Placeholder tokens substituted with glob wildcards, in substitution
/// order. Longer tokens come first so `%pid` is not eaten by `%p` and
/// `%tick` is not eaten by `%t`.
const PLACEHOLDER_WILDCARDS: &[(&str, &str)] = &[
    ("%pid", "{pid}"),
    ("%tick", "*"),
    ("%uid", "*"),
    ("%last", "*"),
    ("%seq", "???"),
    ("%t", "????-??-??_??-??-??"),
    ("%Y", "????"),
    ("%m", "??"),
    ("%d", "??"),
    ("%H", "??"),
    ("%M", "??"),
    ("%S", "??"),
    ("%p", "{pid}"),
];

fn xloggc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-Xloggc:(\S+)").expect("static regex"))
}

fn xlog_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-Xlog:(\S+)").expect("static regex"))
}

fn xverbosegclog_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-Xverbosegclog:(\S+)").expect("static regex"))
}

/// Discover the declared GC-log path in a command line.
///
/// Returns the raw declared path, which may still contain placeholder
/// tokens or pick up rotation suffixes on disk; see [`resolve_current`].
pub fn discover(command_line: &str) -> Option<String> {
    if let Some(caps) = xloggc_re().captures(command_line) {
        return Some(caps[1].to_string());
    }

    // Unified logging: several -Xlog options may be present (for example
    // one routing gc* to stdout and another to a file); scan all of them.
    for caps in xlog_re().captures_iter(command_line) {
        if let Some(path) = unified_output_path(&caps[1]) {
            return Some(path);
        }
    }

    if let Some(caps) = xverbosegclog_re().captures(command_line) {
        let value = &caps[1];
        // With exactly two commas the trailing segments are
        // rotationCount,rotationSize; keep only the path.
        if value.matches(',').count() == 2 {
            return value.split(',').next().map(str::to_string);
        }
        return Some(value.to_string());
    }

    None
}

/// Extract the file output of one `-Xlog:` option string, if it has one.
///
/// JEP 158 grammar: `-Xlog:<selectors>:<output>:<decorators>:<options>`,
/// where output is `file=<path>`, a bare path, `stdout`, or `stderr`.
fn unified_output_path(option: &str) -> Option<String> {
    if !option.starts_with("gc") {
        return None;
    }

    if let Some(idx) = option.find("file=") {
        let value = &option[idx + "file=".len()..];
        // Per the grammar, decorator/rotation groups follow the path
        // after a colon; re-split to isolate the path.
        let path = value.split(':').next().unwrap_or(value);
        if !path.is_empty() {
            return Some(path.to_string());
        }
        return None;
    }

    // Bare-path output form: -Xlog:gc:/tmp/gc.log[:decorators...]
    let mut parts = option.splitn(3, ':');
    let _selectors = parts.next();
    let output = parts.next()?;
    if output.is_empty() || output == "stdout" || output == "stderr" {
        return None;
    }
    Some(output.to_string())
}

/// Discover the GC-log path for a live process, making relative paths
/// absolute where the platform allows it.
///
/// A relative declared path is joined against the target's working
/// directory (POSIX-only introspection); when that capability is
/// missing the path stays relative and a warning is logged, since later
/// capture needs an absolute path to succeed.
pub fn discover_for_pid(pid: u32) -> Option<PathBuf> {
    let command_line = match proc::command_line_of(pid) {
        Ok(line) => line,
        Err(e) => {
            debug!(pid, error = %e, "cannot read command line");
            return None;
        }
    };
    let declared = discover(&command_line)?;
    let declared_path = PathBuf::from(&declared);
    if declared_path.is_absolute() {
        return Some(declared_path);
    }

    match proc::working_dir_of(pid) {
        Ok(cwd) => Some(cwd.join(declared_path)),
        Err(e) => {
            warn!(
                pid,
                path = %declared,
                error = %e,
                "GC log path is relative and the target's working directory is \
                 unavailable; an absolute path is required for capture"
            );
            Some(declared_path)
        }
    }
}

/// Resolve the declared path to the concrete file to read right now.
///
/// Three cases, checked in order:
/// - placeholder tokens → glob expansion, lexicographically-last match
///   wins (timestamp placeholders sort correctly by name);
/// - classic numeric rotation siblings (`base`, `base.1`, …) → latest
///   modification time wins (numeric suffixes carry no recency order,
///   so the name-based tie-break would pick the wrong file);
/// - neither → the literal path.
pub fn resolve_current(declared: &Path, pid: Option<u32>) -> PathBuf {
    let raw = declared.to_string_lossy();

    if raw.contains('%') {
        let pattern = substitute_placeholders(&raw, pid);
        let mut matches = fsglob::glob(&pattern);
        if let Some(last) = matches.pop() {
            debug!(pattern, chosen = %last.display(), "placeholder GC log resolved");
            return last;
        }
        debug!(pattern, "no match for placeholder GC log pattern");
        return declared.to_path_buf();
    }

    if let Some(latest) = latest_rotation_sibling(declared) {
        return latest;
    }

    declared.to_path_buf()
}

/// Substitute placeholder tokens with glob wildcards.
fn substitute_placeholders(raw: &str, pid: Option<u32>) -> String {
    let pid_pattern = pid.map_or_else(|| "*".to_string(), |p| p.to_string());
    let mut pattern = raw.to_string();
    for (token, wildcard) in PLACEHOLDER_WILDCARDS {
        let replacement = if *wildcard == "{pid}" {
            pid_pattern.as_str()
        } else {
            wildcard
        };
        pattern = pattern.replace(token, replacement);
    }
    pattern
}

/// Among `base` and its numeric-suffix rotation siblings (`base.N`),
/// pick the one with the latest modification time.
///
/// Returns `None` when no sibling exists, including when `base` itself
/// is the only candidate (the literal path is used unchanged then).
fn latest_rotation_sibling(base: &Path) -> Option<PathBuf> {
    let base_name = base.file_name()?.to_str()?;
    let parent = base.parent().filter(|p| !p.as_os_str().is_empty())?;
    let entries = std::fs::read_dir(parent).ok()?;

    let mut candidates: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let is_rotation = name
            .strip_prefix(base_name)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()));
        if name == base_name || is_rotation {
            if let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) {
                candidates.push((entry.path(), mtime));
            }
        }
    }

    if candidates.len() < 2 {
        return None;
    }
    candidates
        .into_iter()
        .max_by_key(|(_, mtime)| *mtime)
        .map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;

    #[test]
    fn legacy_xloggc_wins_over_everything() {
        let line = "java -Xloggc:/tmp/old.log -Xlog:gc:file=/tmp/new.log -jar app.jar";
        assert_eq!(discover(line).unwrap(), "/tmp/old.log");
    }

    #[test]
    fn legacy_xloggc_alone() {
        let line = "java -Xloggc:/tmp/old.log -jar app.jar";
        assert_eq!(discover(line).unwrap(), "/tmp/old.log");
    }

    #[test]
    fn unified_file_form_skips_stdout_routes() {
        let line = "java -Xlog:gc*=debug:stdout -Xlog:gc:file=/tmp/gc.log -jar app.jar";
        assert_eq!(discover(line).unwrap(), "/tmp/gc.log");
    }

    #[test]
    fn unified_file_form_strips_decorators_and_rotation_options() {
        let line = "java -Xlog:gc*:file=/var/log/gc-%t.log:time,uptime:filecount=5,filesize=10M";
        assert_eq!(discover(line).unwrap(), "/var/log/gc-%t.log");
    }

    #[test]
    fn unified_bare_path_form() {
        let line = "java -Xlog:gc:/tmp/gc.log -jar app.jar";
        assert_eq!(discover(line).unwrap(), "/tmp/gc.log");
    }

    #[test]
    fn unified_stderr_route_is_not_a_file() {
        assert!(discover("java -Xlog:gc:stderr -jar app.jar").is_none());
    }

    #[test]
    fn non_gc_xlog_options_are_ignored() {
        assert!(discover("java -Xlog:class+load:file=/tmp/classes.log").is_none());
    }

    #[test]
    fn verbosegclog_with_rotation_keeps_path_only() {
        let line = "java -Xverbosegclog:/tmp/verbose.log,5,1024 -jar app.jar";
        assert_eq!(discover(line).unwrap(), "/tmp/verbose.log");
    }

    #[test]
    fn verbosegclog_without_rotation_is_kept_whole() {
        let line = "java -Xverbosegclog:/tmp/verbose.log -jar app.jar";
        assert_eq!(discover(line).unwrap(), "/tmp/verbose.log");
    }

    #[test]
    fn no_gc_flags_discovers_nothing() {
        assert!(discover("java -Xmx4g -jar app.jar").is_none());
    }

    #[test]
    fn placeholder_resolution_picks_lexicographically_last() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app-1-2024-01-01.log"), b"old").unwrap();
        fs::write(dir.path().join("app-1-2024-02-01.log"), b"new").unwrap();

        // Make the lexicographically-earlier file the mtime-newest to
        // prove the name-based tie-break is in effect here.
        set_file_mtime(
            dir.path().join("app-1-2024-01-01.log"),
            FileTime::from_unix_time(2_000_000_000, 0),
        )
        .unwrap();

        let declared = dir.path().join("app-%p-%Y-%m-%d.log");
        let resolved = resolve_current(&declared, Some(1));
        assert!(resolved.ends_with("app-1-2024-02-01.log"));
    }

    #[test]
    fn placeholder_without_match_falls_back_to_declared() {
        let dir = tempfile::tempdir().unwrap();
        let declared = dir.path().join("gc-%t.log");
        assert_eq!(resolve_current(&declared, None), declared);
    }

    #[test]
    fn rotation_siblings_pick_latest_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("gc.log");
        fs::write(&base, b"base").unwrap();
        fs::write(dir.path().join("gc.log.1"), b"one").unwrap();
        fs::write(dir.path().join("gc.log.2"), b"two").unwrap();

        set_file_mtime(&base, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        set_file_mtime(
            dir.path().join("gc.log.1"),
            FileTime::from_unix_time(3_000_000, 0),
        )
        .unwrap();
        set_file_mtime(
            dir.path().join("gc.log.2"),
            FileTime::from_unix_time(2_000_000, 0),
        )
        .unwrap();

        let resolved = resolve_current(&base, None);
        assert!(resolved.ends_with("gc.log.1"));
    }

    #[test]
    fn lone_file_resolves_literally() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("gc.log");
        fs::write(&base, b"base").unwrap();
        assert_eq!(resolve_current(&base, None), base);
    }

    #[test]
    fn non_numeric_suffixes_are_not_rotation_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("gc.log");
        fs::write(&base, b"base").unwrap();
        fs::write(dir.path().join("gc.log.bak"), b"backup").unwrap();

        assert_eq!(resolve_current(&base, None), base);
    }

    #[test]
    fn placeholder_substitution_table() {
        assert_eq!(
            substitute_placeholders("gc-%p-%t.log", Some(42)),
            "gc-42-????-??-??_??-??-??.log"
        );
        assert_eq!(substitute_placeholders("gc-%pid.log", None), "gc-*.log");
        assert_eq!(substitute_placeholders("gc-%seq.log", None), "gc-???.log");
        assert_eq!(
            substitute_placeholders("gc-%Y%m%d.log", None),
            "gc-????????.log"
        );
        assert_eq!(substitute_placeholders("gc-%tick.log", None), "gc-*.log");
    }
}
