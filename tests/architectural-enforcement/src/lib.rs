//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No `unwrap()` or `expect()` in production code
//! - No sleeping in the library; waits are on channels and notifications
//!
//! These tests are designed to catch violations early in the development cycle.
//! The helpers below are shared by every scanner under `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace-relative source directories that ship in the library or binary
pub const PRODUCTION_DIRS: [&str; 2] = ["courier/core/src", "courier/cli/src"];

/// Absolute path of a workspace-relative directory
#[must_use]
pub fn workspace_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

/// Every `.rs` file below `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Lines of `path` that belong to production code, with 1-based numbers
///
/// Everything from the first `#[cfg(test)]` on is treated as test code, and
/// the comment part of each line is dropped.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| (idx + 1, code_part(line).to_string()))
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Scan every production file for lines matching `is_violation`
#[must_use]
pub fn find_violations(dirs: &[&str], is_violation: impl Fn(&Path, &str) -> bool) -> Vec<String> {
    let mut violations = Vec::new();

    for dir in dirs {
        let root = workspace_path(dir);
        if !root.exists() {
            continue;
        }
        for file in rust_files(&root) {
            for (line_number, code) in production_lines(&file) {
                if is_violation(&file, &code) {
                    violations.push(format!(
                        "{}:{} - {}",
                        file.display(),
                        line_number,
                        code.trim()
                    ));
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // note"), "let x = 1; ");
        assert_eq!(code_part("// only a comment"), "");
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let mut file = scratch_file();
        writeln!(file.1, "fn real() {{}}\n\n#[cfg(test)]\nmod tests {{ fn t() {{ x.unwrap(); }} }}").unwrap();

        let lines = production_lines(&file.0);
        assert_eq!(lines, vec![(1, "fn real() {}".to_string())]);
        let _ = fs::remove_file(&file.0);
    }

    fn scratch_file() -> (PathBuf, fs::File) {
        let path = std::env::temp_dir().join(format!(
            "architectural-enforcement-{}.rs",
            std::process::id()
        ));
        let file = fs::File::create(&path).unwrap();
        (path, file)
    }

    #[test]
    fn test_production_dirs_exist() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_path(dir).exists(), "{dir} is missing");
        }
    }
}
