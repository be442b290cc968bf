//! Wildcard expansion for log path patterns.
//!
//! Supports `*` and `?` in the final path component only; parent
//! directories are taken literally. Matching is done by translating the
//! pattern into an anchored regex over directory entry names.

use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether a path contains wildcard characters.
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Expand a pattern into matching paths, sorted by name.
///
/// A pattern without wildcards expands to itself when the file exists,
/// and to nothing otherwise.
pub fn glob(pattern: &str) -> Vec<PathBuf> {
    let path = Path::new(pattern);
    if !has_wildcards(pattern) {
        return if path.exists() {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let Some(file_pattern) = path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let Some(matcher) = pattern_regex(file_pattern) else {
        return Vec::new();
    };

    let entries = match std::fs::read_dir(&parent) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %parent.display(), error = %e, "glob parent unreadable");
            return Vec::new();
        }
    };

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| matcher.is_match(name))
        })
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches
}

/// Translate a `*`/`?` filename pattern into an anchored regex.
fn pattern_regex(file_pattern: &str) -> Option<Regex> {
    let mut translated = String::with_capacity(file_pattern.len() + 8);
    translated.push('^');
    for ch in file_pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn wildcard_detection() {
        assert!(has_wildcards("/var/log/app-*.log"));
        assert!(has_wildcards("gc-????.log"));
        assert!(!has_wildcards("/var/log/app.log"));
    }

    #[test]
    fn literal_path_expands_to_itself_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.log");
        fs::write(&file, b"x").unwrap();

        let pattern = file.to_str().unwrap().to_string();
        assert_eq!(glob(&pattern), vec![file]);
        assert!(glob(dir.path().join("missing.log").to_str().unwrap()).is_empty());
    }

    #[test]
    fn star_matches_any_run_of_characters() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app-1.log"), b"x").unwrap();
        fs::write(dir.path().join("app-22.log"), b"x").unwrap();
        fs::write(dir.path().join("other.txt"), b"x").unwrap();

        let pattern = dir.path().join("app-*.log");
        let matches = glob(pattern.to_str().unwrap());
        let names: Vec<_> = matches
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["app-1.log", "app-22.log"]);
    }

    #[test]
    fn question_mark_matches_exactly_one_character() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("gc.0"), b"x").unwrap();
        fs::write(dir.path().join("gc.10"), b"x").unwrap();

        let pattern = dir.path().join("gc.?");
        let matches = glob(pattern.to_str().unwrap());
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("gc.0"));
    }

    #[test]
    fn regex_metacharacters_in_names_are_literal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.log"), b"x").unwrap();
        fs::write(dir.path().join("appxlog"), b"x").unwrap();

        let pattern = dir.path().join("app.*");
        let matches = glob(pattern.to_str().unwrap());
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("app.log"));
    }

    #[test]
    fn results_are_name_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.log"), b"x").unwrap();
        fs::write(dir.path().join("a.log"), b"x").unwrap();
        fs::write(dir.path().join("c.log"), b"x").unwrap();

        let pattern = dir.path().join("*.log");
        let matches = glob(pattern.to_str().unwrap());
        let names: Vec<_> = matches
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.log", "b.log", "c.log"]);
    }
}
