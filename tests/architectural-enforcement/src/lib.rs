//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code outside retry backoff
//! - No blocking I/O on the presentation path
//! - The reveal engine never reads a clock
//!
//! These tests are designed to catch violations early in the development cycle.
//! The helpers here locate production sources and strip test code so each
//! check only looks at what ships.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, resolved from this package's manifest
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under `dir` (relative to the workspace root)
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Source lines of a file, cut off at its `#[cfg(test)]` module
///
/// Test modules sit at the end of every file in this workspace, so
/// everything after the attribute is test code.
pub fn production_lines(path: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .take_while(|line| line.trim() != "#[cfg(test)]")
        .map(str::to_string)
        .collect()
}

/// The part of a line before any `//` comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }

    #[test]
    fn test_core_sources_found() {
        let files = rust_files("dialogue/core/src");
        assert!(files.iter().any(|p| p.ends_with("controller.rs")));
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // sleep(5)"), "let x = 1; ");
    }
}
