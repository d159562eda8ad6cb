//! Manifest: the structured record of one verification run (component C2).
//!
//! Grounded on `examples/original_source/src/act/artifacts/manifest.py`:
//! `commit_sha` resolution shells out to `git rev-parse HEAD` with a 10s
//! timeout and falls back to the literal `"unknown"` on any failure, never
//! propagating an error for it.

use crate::run_id::RunId;
use crate::types::CommandResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed manifest json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// Overall status of a verification run, shared with `VerifierResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifierStatus {
    Pass,
    Fail,
    InfraError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub container_image: String,
}

impl PlatformInfo {
    pub fn detect(container_image: impl Into<String>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            container_image: container_image.into(),
        }
    }
}

/// Structured record of one verification run. Persisted as pretty JSON at
/// `<run_dir>/manifest.json`; `read(write(m)) == m` bit-for-bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub timestamp_start: DateTime<Utc>,
    pub timestamp_end: DateTime<Utc>,
    pub commit_sha: String,
    pub status: VerifierStatus,
    pub commands_executed: Vec<CommandResult>,
    pub platform: PlatformInfo,
}

/// Resolve `commit_sha` via `git rev-parse HEAD`, timing out after 10s and
/// falling back to `"unknown"` on any failure — not a repo, `git` missing,
/// non-zero exit, or timeout. Never fatal.
pub fn resolve_commit_sha(repo_root: &Path) -> String {
    let (tx, rx) = mpsc::channel();
    let repo_root = repo_root.to_path_buf();
    // Detached: if the timeout fires first the thread is left to finish on
    // its own, matching the daemon-thread pattern in the original pipeline.
    let _ = std::thread::spawn(move || {
        let output = std::process::Command::new("git")
            .arg("-C")
            .arg(&repo_root)
            .args(["rev-parse", "HEAD"])
            .output();
        let _ = tx.send(output);
    });

    match rx.recv_timeout(Duration::from_secs(10)) {
        Ok(Ok(output)) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => "unknown".to_string(),
    }
}

/// Write a manifest as pretty JSON to `<run_dir>/manifest.json`, returning
/// the path written.
pub fn write(run_dir: &Path, manifest: &Manifest) -> Result<PathBuf> {
    let path = run_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Read a manifest from disk. Fails with a typed error on I/O or JSON
/// problems; never partially reconstructs a manifest.
pub fn read(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)?;
    let manifest = serde_json::from_str(&content)?;
    Ok(manifest)
}

pub struct ManifestBuilder {
    pub run_id: RunId,
    pub timestamp_start: DateTime<Utc>,
    pub commit_sha: String,
    pub platform: PlatformInfo,
}

impl ManifestBuilder {
    pub fn new(run_id: RunId, repo_root: &Path, container_image: impl Into<String>) -> Self {
        Self {
            commit_sha: resolve_commit_sha(repo_root),
            platform: PlatformInfo::detect(container_image),
            timestamp_start: Utc::now(),
            run_id,
        }
    }

    pub fn finish(
        self,
        status: VerifierStatus,
        commands_executed: Vec<CommandResult>,
    ) -> Manifest {
        Manifest {
            run_id: self.run_id.as_str().to_string(),
            timestamp_start: self.timestamp_start,
            timestamp_end: Utc::now(),
            commit_sha: self.commit_sha,
            status,
            commands_executed,
            platform: self.platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_manifest() -> Manifest {
        Manifest {
            run_id: "run_20260305_123045_ab12c3".to_string(),
            timestamp_start: Utc::now(),
            timestamp_end: Utc::now(),
            commit_sha: "unknown".to_string(),
            status: VerifierStatus::Pass,
            commands_executed: vec![CommandResult {
                name: "lint".into(),
                command: "true".into(),
                exit_code: 0,
                duration_ms: 12,
            }],
            platform: PlatformInfo::detect("alpine"),
        }
    }

    #[test]
    fn manifest_round_trips_bit_for_bit() {
        let dir = TempDir::new().unwrap();
        let manifest = sample_manifest();
        let path = write(dir.path(), &manifest).unwrap();
        let read_back = read(&path).unwrap();
        assert_eq!(manifest, read_back);
    }

    #[test]
    fn read_fails_typed_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Io(_)));
    }

    #[test]
    fn read_fails_typed_on_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Json(_)));
    }

    #[test]
    fn commit_sha_falls_back_to_unknown_outside_a_repo() {
        let dir = TempDir::new().unwrap();
        let sha = resolve_commit_sha(dir.path());
        assert_eq!(sha, "unknown");
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&VerifierStatus::InfraError).unwrap(),
            "\"INFRA_ERROR\""
        );
    }
}
