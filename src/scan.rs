//! Locating Dependency-Check report files under a workspace root.

use std::path::{Path, PathBuf};

use crate::error::{DepgateError, Result};

/// Default report filename pattern, matching the scanner's default output.
pub const DEFAULT_PATTERN: &str = "**/dependency-check-report.xml";

/// Find report files under `root` matching the glob `pattern` (relative to
/// `root`). Results are sorted so multi-report ingestion is deterministic.
pub fn find_reports(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = root.join(pattern);
    let full = full
        .to_str()
        .ok_or_else(|| DepgateError::Config(format!("Non-UTF-8 path: {}", full.display())))?;

    let entries = glob::glob(full)
        .map_err(|e| DepgateError::Config(format!("Invalid report pattern '{}': {}", pattern, e)))?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            // Unreadable directories are skipped, not fatal; the report we
            // care about either matches or it doesn't.
            Err(e) => eprintln!("Skipping unreadable path while scanning: {}", e),
        }
    }
    paths.sort();
    Ok(paths)
}
