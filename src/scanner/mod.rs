//! Data file discovery.
//!
//! Exports are dropped into a directory with a date stamp in the name, so the
//! dashboard loads the newest file matching a glob pattern.

use anyhow::{anyhow, Context, Result};
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

/// Compile a file-name glob such as `press.*.csv`.
pub fn file_matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("Invalid file pattern: {}", pattern))?
        .compile_matcher())
}

/// The most recently modified file directly inside `dir` matching `pattern`.
pub fn find_most_recent(dir: &Path, pattern: &str) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(anyhow!("Data directory not found: {}", dir.display()));
    }

    let matcher = file_matcher(pattern)?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        if !matcher.is_match(entry.file_name()) {
            continue;
        }

        let modified = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?
            .modified()?;
        debug!("Candidate data file: {}", entry.path().display());

        // Ties go to the lexically greater name, which is the later date stamp.
        let is_newer = match &newest {
            None => true,
            Some((time, path)) => (modified, entry.path()) > (*time, path.as_path()),
        };
        if is_newer {
            newest = Some((modified, entry.path().to_path_buf()));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(|| {
        anyhow!(
            "No file matching '{}' found in {}",
            pattern,
            dir.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_file_matcher() {
        let matches = |pattern: &str, name: &str| file_matcher(pattern).unwrap().is_match(name);
        assert!(matches("press.*.csv", "press.2024-01-05.csv"));
        assert!(matches("*.csv", "a.csv"));
        assert!(matches("press*", "press"));
        assert!(matches("press.202[34]*.csv", "press.2024-06.csv"));
        assert!(matches("grants.{csv,tsv}", "grants.tsv"));
        assert!(!matches("press.*.csv", "press.csv"));
        assert!(!matches("press.*.csv", "grants.2024.csv"));
        assert!(!matches("press.202[34]*.csv", "press.2025-01.csv"));
        assert!(!matches("exact.csv", "exact.csv.bak"));
        assert!(file_matcher("press.[.csv").is_err());
    }

    #[test]
    fn test_find_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("press.2023.csv");
        let newer = dir.path().join("press.2024.csv");
        fs::write(&older, "id\n1\n").unwrap();
        fs::write(&newer, "id\n2\n").unwrap();
        fs::write(dir.path().join("grants.2025.csv"), "id\n3\n").unwrap();

        let now = SystemTime::now();
        let file = fs::File::options().write(true).open(&older).unwrap();
        file.set_modified(now - Duration::from_secs(3600)).unwrap();
        let file = fs::File::options().write(true).open(&newer).unwrap();
        file.set_modified(now).unwrap();

        assert_eq!(find_most_recent(dir.path(), "press.*.csv").unwrap(), newer);
    }

    #[test]
    fn test_find_most_recent_without_match() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_most_recent(dir.path(), "press.*.csv").unwrap_err();
        assert!(err.to_string().contains("press.*.csv"));
        assert!(find_most_recent(&dir.path().join("missing"), "*").is_err());
    }
}
