//! Assertions over restored files and captured logs.
//!
//! Each check returns `HarnessError::Assertion` with enough context to
//! diagnose the failure without re-running: logs are embedded inline, file
//! mismatches carry a line diff.

use std::path::Path;

use crate::error::{HarnessError, Result};

/// Marker file the CLI may leave in a restore target.
pub const SKIP_MARKER: &str = ".skip-trusted-artifacts";

/// Fails unless every whitespace-separated word occurs in `logs`.
///
/// # Errors
///
/// Returns `HarnessError::Assertion` naming the first missing word.
pub fn logs_contain_words(logs: &str, words: &str) -> Result<()> {
    match words.split_whitespace().find(|w| !logs.contains(w)) {
        Some(missing) => Err(HarnessError::assertion(format!(
            "logs do not contain the keyword: {missing:?}\n{logs}"
        ))),
        None => Ok(()),
    }
}

/// Fails unless `line` occurs verbatim in `logs`.
///
/// # Errors
///
/// Returns `HarnessError::Assertion` if the line is missing.
pub fn logs_contain_line(logs: &str, line: &str) -> Result<()> {
    if logs.contains(line) {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "logs do not contain the line: {line:?}\n{logs}"
        )))
    }
}

/// Fails unless `expected` and `actual` are byte-identical.
///
/// The diff in the error is line-oriented for readability; equality itself
/// is exact.
///
/// # Errors
///
/// Returns `HarnessError::Assertion` with a diff on mismatch.
pub fn bytes_match(what: &str, expected: &[u8], actual: &[u8]) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(HarnessError::assertion(format!(
        "{what} does not match:\n{}",
        line_diff(&String::from_utf8_lossy(expected), &String::from_utf8_lossy(actual))
    )))
}

/// Renders a line-by-line diff: `-` lines from `expected`, `+` from `actual`.
#[must_use]
pub fn line_diff(expected: &str, actual: &str) -> String {
    let left: Vec<&str> = expected.split('\n').collect();
    let right: Vec<&str> = actual.split('\n').collect();
    let mut out = String::new();

    for i in 0..left.len().max(right.len()) {
        match (left.get(i), right.get(i)) {
            (Some(l), Some(r)) if l == r => {
                out.push_str("  ");
                out.push_str(&format!("{l:?}"));
            }
            (l, r) => {
                if let Some(l) = l {
                    out.push_str(&format!("- {l:?}"));
                }
                if let Some(r) = r {
                    if l.is_some() {
                        out.push('\n');
                    }
                    out.push_str(&format!("+ {r:?}"));
                }
            }
        }
        out.push('\n');
    }
    out
}

/// Fails if `dir` holds anything besides the skip marker.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read, or
/// `HarnessError::Assertion` listing the unexpected entries.
pub fn dir_is_empty(dir: &Path) -> Result<()> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        if name != SKIP_MARKER {
            entries.push(name.to_string_lossy().into_owned());
        }
    }
    if entries.is_empty() {
        return Ok(());
    }
    entries.sort();
    Err(HarnessError::assertion(format!(
        "there are files in {}: {entries:?}",
        dir.display()
    )))
}
