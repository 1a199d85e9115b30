//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the `pushstream-core` sources:
//! - No blocking std I/O inside async code paths
//! - No thread sleeps in production code, and timer sleeps only in the heartbeat
//!
//! These tests are designed to catch violations early in the development cycle.

use std::fs;
use std::path::{Path, PathBuf};

/// Root of the production sources scanned by the enforcement tests.
pub fn core_src_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("pushstream")
        .join("core")
        .join("src")
}

/// One production source file, with its `#[cfg(test)]` tail cut off
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Path relative to the scanned root, with `/` separators
    pub fn relative_path(&self, root: &Path) -> String {
        self.path
            .strip_prefix(root)
            .unwrap_or(&self.path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Read every `.rs` file under `root`, keeping only the lines before the
/// first `#[cfg(test)]` marker.
pub fn production_sources(root: &Path) -> Vec<SourceFile> {
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            lines: production_lines(&content),
        });
    }

    files
}

/// Lines of `content` up to (not including) the first test module marker
pub fn production_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .take_while(|line| line.trim() != "#[cfg(test)]")
        .map(str::to_string)
        .collect()
}

/// Strip a trailing `//` comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether the closest function signature above `idx` is an `async fn`.
///
/// Async blocks inside a sync function count as sync; the scan is textual.
pub fn in_async_fn<S: AsRef<str>>(lines: &[S], idx: usize) -> bool {
    for line in lines[..=idx].iter().rev() {
        let code = code_part(line.as_ref()).trim();
        if code.contains("async fn ") {
            return true;
        }
        if code.starts_with("fn ") || code.contains(" fn ") {
            return false;
        }
        if code.starts_with("impl ") || code.starts_with("mod ") {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        let lines = production_lines(content);
        assert_eq!(lines, vec!["fn a() {}".to_string(), String::new()]);
    }

    #[test]
    fn test_async_fn_detection() {
        let lines = vec![
            "pub async fn send(&self) {",
            "    let body = std::fs::read_to_string(\"x\");",
            "}",
        ];
        assert!(in_async_fn(&lines, 1));
    }

    #[test]
    fn test_sync_fn_detection() {
        let lines = vec![
            "fn load_with_env(path: PathBuf) -> Result<(), Error> {",
            "    let body = std::fs::read_to_string(path)?;",
            "}",
        ];
        assert!(!in_async_fn(&lines, 1));
    }

    #[test]
    fn test_comment_mentioning_async_fn_is_ignored() {
        let lines = vec![
            "pub fn load() {",
            "    // called before any async fn runs",
            "    let body = std::fs::read_to_string(\"x\");",
            "}",
        ];
        assert!(!in_async_fn(&lines, 2));
    }

    #[test]
    fn test_core_src_dir_exists() {
        assert!(core_src_dir().join("lib.rs").exists());
    }
}
