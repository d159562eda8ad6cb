//! Log writer: per-step log files, a combined append-only log, and tail
//! extraction (component C3).
//!
//! Grounded on `examples/original_source/src/act/verifier/logs.py` for the
//! filename convention and tail extraction, and on
//! `examples/original_source/src/act/verifier/pipeline.py` for the exact
//! step log header/footer text.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of trailing lines `extract_tail` returns by default.
pub const TAIL_LOG_LINES: usize = 200;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;

/// `step-<NN>-<name>.log`, `<NN>` 1-based and zero-padded to two digits.
pub fn step_log_filename(step_number: u32, name: &str) -> String {
    format!("step-{step_number:02}-{name}.log")
}

/// Render one step's log body:
/// ```text
/// === Step <N>: <name> ===
/// Command: <command>
/// ========================================
///
/// <captured output>
///
/// [TIMEOUT] Step killed after <T>s        (only if timed_out)
///
/// Exit code: <exit_code>
/// ```
pub fn format_step_log(
    step_number: u32,
    name: &str,
    command: &str,
    output: &str,
    exit_code: i32,
    timed_out: bool,
    timeout_sec: u64,
) -> String {
    let mut body = String::new();
    body.push_str(&format!("=== Step {step_number}: {name} ===\n"));
    body.push_str(&format!("Command: {command}\n"));
    body.push_str(&"=".repeat(40));
    body.push_str("\n\n");
    body.push_str(output.trim_end_matches('\n'));
    body.push('\n');
    if timed_out {
        body.push_str(&format!("\n[TIMEOUT] Step killed after {timeout_sec}s\n"));
    }
    body.push_str(&format!("\nExit code: {exit_code}\n"));
    body
}

/// Write a step's rendered log body to `<logs_dir>/step-<NN>-<name>.log`.
pub fn write_step_log(logs_dir: &Path, step_number: u32, name: &str, content: &str) -> Result<PathBuf> {
    let path = logs_dir.join(step_log_filename(step_number, name));
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Append a step's log body to `combined.log`, ensuring the file ends with
/// a trailing newline after the append.
pub fn append_combined_log(combined_log: &Path, content: &str) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(combined_log)?;
    file.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Return the last `n` lines of `path`, the full content if it has fewer
/// than `n` lines, or the empty string if the file is absent or unreadable.
pub fn extract_tail(path: &Path, n: usize) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return String::new();
    };
    if content.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Recursively enumerate regular files under `run_dir`, sorted
/// lexicographically.
pub fn list_artifact_paths(run_dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    collect_files(run_dir, &mut paths);
    paths.sort();
    paths
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filename_zero_pads_step_number() {
        assert_eq!(step_log_filename(1, "lint"), "step-01-lint.log");
        assert_eq!(step_log_filename(12, "bench"), "step-12-bench.log");
    }

    #[test]
    fn format_includes_header_and_exit_code() {
        let log = format_step_log(1, "lint", "cargo clippy", "ok\n", 0, false, 300);
        assert!(log.starts_with("=== Step 1: lint ===\n"));
        assert!(log.contains("Command: cargo clippy\n"));
        assert!(log.contains("Exit code: 0"));
        assert!(!log.contains("[TIMEOUT]"));
    }

    #[test]
    fn format_includes_timeout_marker() {
        let log = format_step_log(1, "hang", "sleep 3600", "", 124, true, 1);
        assert!(log.contains("[TIMEOUT] Step killed after 1s"));
        assert!(log.contains("Exit code: 124"));
    }

    #[test]
    fn tail_returns_full_content_when_shorter_than_n() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.log");
        std::fs::write(&path, "a\nb\nc\n").unwrap();
        assert_eq!(extract_tail(&path, 200), "a\nb\nc");
    }

    #[test]
    fn tail_truncates_to_last_n_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.log");
        let content: String = (0..300).map(|i| format!("line{i}\n")).collect();
        std::fs::write(&path, content).unwrap();
        let tail = extract_tail(&path, TAIL_LOG_LINES);
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), TAIL_LOG_LINES);
        assert_eq!(lines[0], "line100");
        assert_eq!(lines[TAIL_LOG_LINES - 1], "line299");
    }

    #[test]
    fn tail_is_empty_for_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(extract_tail(&dir.path().join("nope.log"), 200), "");
    }

    #[test]
    fn combined_log_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.log");
        append_combined_log(&path, "first\n").unwrap();
        append_combined_log(&path, "second\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn artifact_paths_are_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("manifest.json"), "{}").unwrap();
        std::fs::write(dir.path().join("logs/combined.log"), "x").unwrap();
        std::fs::write(dir.path().join("logs/step-01-lint.log"), "x").unwrap();

        let paths = list_artifact_paths(dir.path());
        assert_eq!(paths.len(), 3);
        assert!(paths.windows(2).all(|w| w[0] <= w[1]));
    }
}
